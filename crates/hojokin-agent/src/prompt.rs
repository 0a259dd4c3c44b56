use std::fmt::Write;

use hojokin_applications::{Application, SectionSpec, SubsidyProgram};
use hojokin_users::User;

/// Rendered in place of any field the user left empty.
pub const BLANK: &str = "（未記入）";

const SYSTEM_PROMPT: &str = "\
あなたは日本の中小企業向け補助金申請を専門とする経験豊富なコンサルタントです。
審査員が評価しやすい、具体的で説得力のある申請書の文章を作成してください。

ルール:
- 出力は日本語の本文のみとし、見出しや前置き、Markdown記法は付けないこと。
- 提供された情報にない数値・実績・固有名詞を創作しないこと。必要な数値が不明な場合は「〇〇」と記載すること。
- 指定された文字数の上限を超えないこと。
- 審査項目を意識し、課題・取組・効果の因果関係が明確になるように書くこと。";

fn or_blank(s: &str) -> &str {
    if s.trim().is_empty() {
        BLANK
    } else {
        s.trim()
    }
}

fn opt_num(v: Option<i64>, unit: &str) -> String {
    match v {
        Some(n) => format!("{n}{unit}"),
        None => BLANK.to_string(),
    }
}

/// Composes the system prompt and one user prompt per application section.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    /// Prompt for drafting one section of `app`.
    pub fn section_prompt(
        &self,
        program: &SubsidyProgram,
        section: &SectionSpec,
        company: &User,
        app: &Application,
    ) -> String {
        let mut p = String::new();

        let _ = writeln!(p, "## 補助金");
        let _ = writeln!(p, "名称: {}", program.name);
        let _ = writeln!(p, "概要: {}", or_blank(&program.description));
        let _ = writeln!(p, "補助上限額: {}円 / 補助率: {}", program.max_amount_yen, program.subsidy_rate);
        if !program.requirements.is_empty() {
            let _ = writeln!(p, "申請要件:");
            for r in &program.requirements {
                let _ = writeln!(p, "- {r}");
            }
        }
        if !program.scoring_criteria.is_empty() {
            let _ = writeln!(p, "審査項目:");
            for c in &program.scoring_criteria {
                let _ = writeln!(p, "- {c}");
            }
        }

        let _ = writeln!(p);
        let _ = writeln!(p, "## 申請者");
        let _ = writeln!(p, "企業名: {}", or_blank(&company.company_name));
        let _ = writeln!(p, "代表者: {}", or_blank(&company.representative_name));
        let _ = writeln!(p, "業種: {}", or_blank(&company.industry));
        let _ = writeln!(p, "所在地: {}", or_blank(&company.prefecture));
        let _ = writeln!(p, "従業員数: {}", opt_num(company.employee_count, "名"));
        let _ = writeln!(p, "資本金: {}", opt_num(company.capital_yen, "円"));

        let _ = writeln!(p);
        let _ = writeln!(p, "## 事業計画（申請者の入力）");
        let _ = writeln!(p, "件名: {}", or_blank(&app.title));
        let _ = writeln!(p, "事業概要: {}", or_blank(&app.business_overview));
        let _ = writeln!(p, "現状の課題: {}", or_blank(&app.current_challenges));
        let _ = writeln!(p, "取組内容: {}", or_blank(&app.plan_details));
        let _ = writeln!(p, "期待される効果: {}", or_blank(&app.expected_effects));
        let _ = writeln!(p, "予算計画: {}", or_blank(&app.budget_plan));
        let _ = writeln!(p, "申請額: {}", opt_num(app.requested_amount_yen, "円"));

        let _ = writeln!(p);
        let _ = writeln!(p, "## 作成する項目");
        let _ = writeln!(p, "項目名: {}", section.title);
        let _ = writeln!(p, "記載内容: {}", or_blank(&section.guidance));
        let _ = writeln!(p, "文字数上限: {}字", section.max_chars);
        let _ = writeln!(p);
        let _ = write!(p, "上記の情報をもとに「{}」の本文を作成してください。", section.title);
        p
    }
}
