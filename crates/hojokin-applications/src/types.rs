use hojokin_core::types::ApplicationStatus;
use serde::{Deserialize, Serialize};

/// One section of the written application a program asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Stable identifier used by the editor and by section locks.
    pub key: String,
    pub title: String,
    /// What reviewers expect in this section; fed to the drafting prompt.
    pub guidance: String,
    /// Character limit imposed by the application form.
    pub max_chars: usize,
}

/// A government funding scheme. Reference data seeded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsidyProgram {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub max_amount_yen: i64,
    /// Share of eligible costs covered, e.g. "1/2" or "2/3".
    pub subsidy_rate: String,
    pub requirements: Vec<String>,
    pub scoring_criteria: Vec<String>,
    pub sections: Vec<SectionSpec>,
}

impl SubsidyProgram {
    pub fn section(&self, key: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.key == key)
    }
}

/// AI-drafted text, one entry per program section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub sections: Vec<GeneratedSection>,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub generated_at: String,
}

impl GeneratedContent {
    pub fn section(&self, key: &str) -> Option<&GeneratedSection> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Replace (or append) the sections present in `other`, keeping the rest.
    /// Used when a single section is regenerated.
    pub fn merge(&mut self, other: GeneratedContent) {
        for incoming in other.sections {
            match self.sections.iter_mut().find(|s| s.key == incoming.key) {
                Some(existing) => *existing = incoming,
                None => self.sections.push(incoming),
            }
        }
        self.model = other.model;
        self.tokens_in = self.tokens_in.saturating_add(other.tokens_in);
        self.tokens_out = self.tokens_out.saturating_add(other.tokens_out);
        self.generated_at = other.generated_at;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub key: String,
    pub title: String,
    pub text: String,
}

/// A user's request against one subsidy program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub owner_id: String,
    pub program_id: String,
    pub title: String,
    pub business_overview: String,
    pub current_challenges: String,
    pub plan_details: String,
    pub expected_effects: String,
    pub budget_plan: String,
    pub requested_amount_yen: Option<i64>,
    pub status: ApplicationStatus,
    pub generated_content: Option<GeneratedContent>,
    /// Reason of the last failed generation; cleared when a new one starts.
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApplication {
    pub program_id: String,
    pub title: String,
    #[serde(default)]
    pub business_overview: String,
    #[serde(default)]
    pub current_challenges: String,
    #[serde(default)]
    pub plan_details: String,
    #[serde(default)]
    pub expected_effects: String,
    #[serde(default)]
    pub budget_plan: String,
    #[serde(default)]
    pub requested_amount_yen: Option<i64>,
}

/// Partial update of the plan fields. Saves are last-write-wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationUpdate {
    pub title: Option<String>,
    pub business_overview: Option<String>,
    pub current_challenges: Option<String>,
    pub plan_details: Option<String>,
    pub expected_effects: Option<String>,
    pub budget_plan: Option<String>,
    pub requested_amount_yen: Option<i64>,
    /// Hand-edited generated sections, merged by key.
    pub generated_sections: Option<Vec<GeneratedSection>>,
}

impl ApplicationUpdate {
    pub fn apply(self, app: &mut Application) {
        if let Some(v) = self.title {
            app.title = v;
        }
        if let Some(v) = self.business_overview {
            app.business_overview = v;
        }
        if let Some(v) = self.current_challenges {
            app.current_challenges = v;
        }
        if let Some(v) = self.plan_details {
            app.plan_details = v;
        }
        if let Some(v) = self.expected_effects {
            app.expected_effects = v;
        }
        if let Some(v) = self.budget_plan {
            app.budget_plan = v;
        }
        if let Some(v) = self.requested_amount_yen {
            app.requested_amount_yen = Some(v);
        }
        if let Some(sections) = self.generated_sections {
            match app.generated_content.as_mut() {
                Some(content) => {
                    for incoming in sections {
                        match content.sections.iter_mut().find(|s| s.key == incoming.key) {
                            Some(existing) => existing.text = incoming.text,
                            None => content.sections.push(incoming),
                        }
                    }
                }
                None => {
                    app.generated_content = Some(GeneratedContent {
                        sections,
                        model: "manual".to_string(),
                        tokens_in: 0,
                        tokens_out: 0,
                        generated_at: chrono::Utc::now().to_rfc3339(),
                    });
                }
            }
        }
    }
}

/// Reusable text snippet owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub category: Option<String>,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub body: Option<String>,
}
