use rusqlite::{params, Connection};

use crate::error::{ApplicationError, Result};
use crate::types::{SectionSpec, SubsidyProgram};

fn section(key: &str, title: &str, guidance: &str, max_chars: usize) -> SectionSpec {
    SectionSpec {
        key: key.to_string(),
        title: title.to_string(),
        guidance: guidance.to_string(),
        max_chars,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The catalog shipped with the server.
pub fn builtin_programs() -> Vec<SubsidyProgram> {
    vec![
        SubsidyProgram {
            id: "monozukuri".to_string(),
            name: "ものづくり・商業・サービス生産性向上促進補助金".to_string(),
            category: "設備投資".to_string(),
            description: "中小企業等が取り組む革新的な製品・サービスの開発や生産プロセスの改善に必要な設備投資等を支援する。".to_string(),
            max_amount_yen: 12_500_000,
            subsidy_rate: "1/2".to_string(),
            requirements: strings(&[
                "付加価値額を年率平均3%以上増加させる事業計画であること",
                "給与支給総額を年率平均1.5%以上増加させること",
                "事業場内最低賃金を地域別最低賃金+30円以上とすること",
            ]),
            scoring_criteria: strings(&[
                "技術面: 取組内容の革新性と課題解決の妥当性",
                "事業化面: 市場ニーズの把握と事業化に向けた体制",
                "政策面: 地域経済への波及効果",
            ]),
            sections: vec![
                section("business_overview", "事業概要", "自社の事業内容、主要製品・サービス、主要取引先を簡潔に説明する。", 800),
                section("current_challenges", "現状の課題", "生産性や品質に関する具体的な課題を数値とともに示す。", 800),
                section("plan_details", "事業計画・実施内容", "導入する設備と、それによる生産プロセスの革新内容を実施スケジュールとともに記載する。", 1500),
                section("innovation", "技術的優位性・革新性", "同業他社や従来手法と比べた新規性・優位性を説明する。", 1000),
                section("expected_effects", "期待される効果", "付加価値額・給与支給総額の増加見込みを含め、定量的に記載する。", 1000),
                section("funding_plan", "資金計画", "補助対象経費の内訳と自己資金・借入の調達方法を記載する。", 600),
            ],
        },
        SubsidyProgram {
            id: "it-dounyu".to_string(),
            name: "IT導入補助金".to_string(),
            category: "デジタル化".to_string(),
            description: "中小企業・小規模事業者がITツールを導入し、業務効率化・売上向上を図る取組を支援する。".to_string(),
            max_amount_yen: 4_500_000,
            subsidy_rate: "1/2".to_string(),
            requirements: strings(&[
                "IT導入支援事業者が登録したITツールを導入すること",
                "労働生産性の向上に係る数値目標を設定すること",
            ]),
            scoring_criteria: strings(&[
                "導入するITツールと業務課題の整合性",
                "労働生産性向上の実現可能性",
                "インボイス制度への対応",
            ]),
            sections: vec![
                section("business_overview", "事業概要", "事業内容と業務フローの概要を記載する。", 600),
                section("current_challenges", "業務上の課題", "現在の業務で発生している非効率や属人化を具体的に記載する。", 800),
                section("it_tools", "導入するITツール", "導入するツールと、どの業務プロセスに適用するかを記載する。", 800),
                section("expected_effects", "導入効果（生産性向上）", "作業時間削減などの効果と3年後の労働生産性目標を記載する。", 800),
            ],
        },
        SubsidyProgram {
            id: "jizokuka".to_string(),
            name: "小規模事業者持続化補助金".to_string(),
            category: "販路開拓".to_string(),
            description: "小規模事業者が商工会・商工会議所の支援を受けて作成した経営計画に基づく販路開拓等の取組を支援する。".to_string(),
            max_amount_yen: 2_000_000,
            subsidy_rate: "2/3".to_string(),
            requirements: strings(&[
                "常時使用する従業員数が小規模事業者の定義内であること",
                "商工会・商工会議所の事業支援計画書を取得すること",
            ]),
            scoring_criteria: strings(&[
                "自社の経営状況分析の妥当性",
                "経営方針・目標と今後のプランの適切性",
                "補助事業計画の有効性と積算の透明性",
            ]),
            sections: vec![
                section("company_profile", "企業概要", "創業からの沿革、事業内容、従業員構成を記載する。", 800),
                section("market_trends", "顧客ニーズと市場の動向", "ターゲット顧客と市場環境の変化を記載する。", 800),
                section("strengths", "自社や自社の提供する商品・サービスの強み", "顧客から評価されている点、他社との差別化要素を記載する。", 800),
                section("sales_plan", "販路開拓等の取組内容", "補助事業で実施する具体的な取組とスケジュールを記載する。", 1200),
                section("expected_effects", "補助事業の効果", "売上・顧客数などの増加見込みを記載する。", 800),
            ],
        },
        SubsidyProgram {
            id: "saikouchiku".to_string(),
            name: "事業再構築補助金".to_string(),
            category: "事業転換".to_string(),
            description: "新分野展開、事業転換、業種転換等の思い切った事業再構築に挑戦する中小企業等を支援する。".to_string(),
            max_amount_yen: 70_000_000,
            subsidy_rate: "2/3".to_string(),
            requirements: strings(&[
                "事業再構築指針に示す事業再構築の定義に該当すること",
                "認定経営革新等支援機関と事業計画を策定すること",
                "付加価値額を年率平均4%以上増加させること",
            ]),
            scoring_criteria: strings(&[
                "事業化点: 市場の有望性と実現可能性",
                "再構築点: 既存事業との相乗効果と経営資源の活用",
                "政策点: 経済成長を牽引する取組であるか",
            ]),
            sections: vec![
                section("business_overview", "現在の事業状況", "既存事業の内容、強み・弱み、業績推移を記載する。", 1000),
                section("restructuring_plan", "事業再構築の具体的内容", "新たに取り組む事業の内容と、既存事業からの転換点を記載する。", 1500),
                section("market_analysis", "市場分析", "新事業の市場規模、競合、参入戦略を記載する。", 1200),
                section("implementation", "実施体制とスケジュール", "実施体制、スケジュール、課題とその解決方法を記載する。", 1000),
                section("expected_effects", "収益計画と効果", "売上・付加価値額の5年間の計画と算出根拠を記載する。", 1000),
            ],
        },
    ]
}

fn row_to_program(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubsidyProgram> {
    Ok(SubsidyProgram {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        max_amount_yen: row.get(4)?,
        subsidy_rate: row.get(5)?,
        requirements: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        scoring_criteria: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        sections: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
    })
}

const PROGRAM_COLUMNS: &str = "id, name, category, description, max_amount_yen, subsidy_rate,
     requirements, scoring_criteria, sections";

pub fn list_programs(conn: &Connection) -> Result<Vec<SubsidyProgram>> {
    let sql = format!("SELECT {PROGRAM_COLUMNS} FROM subsidy_programs ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_program)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_program(conn: &Connection, id: &str) -> Result<SubsidyProgram> {
    let sql = format!("SELECT {PROGRAM_COLUMNS} FROM subsidy_programs WHERE id = ?1");
    match conn.query_row(&sql, params![id], row_to_program) {
        Ok(p) => Ok(p),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ApplicationError::ProgramNotFound(id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_are_unique_per_program() {
        for p in builtin_programs() {
            let mut keys: Vec<_> = p.sections.iter().map(|s| s.key.as_str()).collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(before, keys.len(), "duplicate section key in {}", p.id);
            assert!(p.sections.iter().all(|s| s.max_chars > 0));
        }
    }

    #[test]
    fn seeded_catalog_reads_back() {
        let conn = Connection::open_in_memory().unwrap();
        hojokin_users::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        // second init must not duplicate or fail
        crate::db::init_db(&conn).unwrap();

        let programs = list_programs(&conn).unwrap();
        assert_eq!(programs.len(), builtin_programs().len());

        let jizokuka = get_program(&conn, "jizokuka").unwrap();
        assert_eq!(jizokuka.subsidy_rate, "2/3");
        assert!(jizokuka.section("sales_plan").is_some());
        assert!(matches!(
            get_program(&conn, "nope"),
            Err(ApplicationError::ProgramNotFound(_))
        ));
    }
}
