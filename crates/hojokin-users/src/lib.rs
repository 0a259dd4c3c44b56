pub mod accounts;
pub mod db;
pub mod error;
pub mod manager;
pub mod password;
pub mod token;
pub mod types;

pub use error::UserError;
pub use manager::UserManager;
pub use token::TokenSigner;
pub use types::{NewUser, ProfileUpdate, User};
