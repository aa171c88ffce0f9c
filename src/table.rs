use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY, Attribute, Cell, CellAlignment,
    Color, ContentArrangement, Table,
};

use crate::rank::Ranking;

const DISPLAY_LIMIT: usize = 15;

fn get_visibility_ratio(current_pct: f64, top_pct: f64) -> f64 {
    let mut ratio = 0.4 + 0.6 * (current_pct / top_pct);
    if ratio < 0.4 {
        ratio = 0.4;
    }
    ratio
}

/// Prints the qualifying funds as a terminal table, best first.
pub fn render(ranking: &Ranking) {
    if ranking.funds.is_empty() {
        println!("No funds qualified for the ranking.");
        return;
    }

    let ranked_weeks: Vec<String> = ranking.weeks.iter().map(|w| format!("{w}w")).collect();
    let title = format!("(Top funds over {} lookbacks)", ranked_weeks.join("/"));

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Fund").add_attribute(Attribute::Bold),
            Cell::new("Full Fund Name").add_attribute(Attribute::Bold),
            Cell::new("Weeks Hit").add_attribute(Attribute::Bold).set_alignment(CellAlignment::Right),
            Cell::new("Avg Profit (%)")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    let top_mean = ranking.funds[0].mean_profit().unwrap_or(0.0);
    let safe_top = if top_mean == 0.0 { 1.0 } else { top_mean };

    let mut rank = 1;
    for fund in ranking.funds.iter().take(DISPLAY_LIMIT) {
        let mean = fund.mean_profit().unwrap_or(0.0);
        let ratio = get_visibility_ratio(mean, safe_top);

        let cyan_val = (255.0 * ratio) as u8;
        let green_val = (255.0 * ratio) as u8;
        let gray_val = (150.0 * ratio) as u8;

        let rank_cell = Cell::new(rank).fg(Color::DarkGrey);

        let code_cell = Cell::new(&fund.code).fg(Color::Rgb {
            r: 0,
            g: cyan_val,
            b: cyan_val,
        });

        let name_cell = Cell::new(&fund.name).fg(Color::Rgb {
            r: gray_val,
            g: gray_val,
            b: gray_val,
        });

        let hits_cell = Cell::new(format!("{}/{}", fund.appearances, ranking.weeks.len()))
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right);

        let mean_cell = Cell::new(format!("{mean:.2}%"))
            .fg(Color::Rgb {
                r: 0,
                g: green_val,
                b: 0,
            })
            .set_alignment(CellAlignment::Right);

        table.add_row(vec![rank_cell, code_cell, name_cell, hits_cell, mean_cell]);

        rank += 1;
    }

    println!("\n{}\n{}", title, table);
}
