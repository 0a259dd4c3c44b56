//! Markdown rendering of an application for download.
//!
//! Sections follow the program's order. Sections the program does not know
//! about (e.g. from an older catalog) are appended at the end so nothing the
//! user wrote is dropped.

use std::fmt::Write;

use crate::types::{Application, SubsidyProgram};

const MISSING: &str = "（未作成）";

fn yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0 {
        out.insert(0, '-');
    }
    format!("{out}円")
}

/// Render `app` as a Markdown document.
pub fn render_markdown(app: &Application, program: &SubsidyProgram, company: Option<&str>) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}", app.title);
    let _ = writeln!(md);
    let _ = writeln!(md, "- 補助金: {}", program.name);
    if let Some(company) = company {
        let _ = writeln!(md, "- 申請者: {company}");
    }
    if let Some(amount) = app.requested_amount_yen {
        let _ = writeln!(md, "- 申請額: {}", yen(amount));
    }
    let _ = writeln!(
        md,
        "- 補助上限: {}（補助率 {}）",
        yen(program.max_amount_yen),
        program.subsidy_rate
    );
    let _ = writeln!(md, "- ステータス: {}", app.status);
    let _ = writeln!(md, "- 最終更新: {}", app.updated_at);

    let content = app.generated_content.as_ref();
    for spec in &program.sections {
        let text = content
            .and_then(|c| c.section(&spec.key))
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty());
        let _ = writeln!(md);
        let _ = writeln!(md, "## {}", spec.title);
        let _ = writeln!(md);
        match text {
            Some(t) => {
                let _ = writeln!(md, "{t}");
                let count = t.chars().count();
                if count > spec.max_chars {
                    let _ = writeln!(md);
                    let _ = writeln!(md, "> 文字数超過: {count} / {}字", spec.max_chars);
                }
            }
            None => {
                let _ = writeln!(md, "{MISSING}");
            }
        }
    }

    if let Some(c) = content {
        for extra in c.sections.iter().filter(|s| program.section(&s.key).is_none()) {
            let _ = writeln!(md);
            let _ = writeln!(md, "## {}", extra.title);
            let _ = writeln!(md);
            let _ = writeln!(md, "{}", extra.text.trim());
        }
    }
    md
}
