// Well-known WS method and event names shared with the web client.

// handshake
pub const CONNECT: &str = "connect";
pub const PING: &str = "ping";

// collaboration rooms
pub const COLLAB_JOIN: &str = "collab.join";
pub const COLLAB_LEAVE: &str = "collab.leave";
pub const COLLAB_EDIT: &str = "collab.edit";
pub const COLLAB_CURSOR: &str = "collab.cursor";
pub const COLLAB_LOCK: &str = "collab.lock";
pub const COLLAB_UNLOCK: &str = "collab.unlock";
pub const COLLAB_PRESENCE: &str = "collab.presence";

/// Server-pushed event names.
pub mod events {
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    pub const TICK: &str = "tick";
    pub const USER_JOINED: &str = "collab.user_joined";
    pub const USER_LEFT: &str = "collab.user_left";
    pub const EDIT: &str = "collab.edit";
    pub const CURSOR: &str = "collab.cursor";
    pub const LOCKED: &str = "collab.locked";
    pub const UNLOCKED: &str = "collab.unlocked";
    pub const NOTIFICATION: &str = "notification";
}
