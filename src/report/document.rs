use chrono::NaiveDate;

use crate::config::ReportLayout;
use crate::database::schema::ShoppingListItem;

/// Renders the aggregated shopping list as a printable plain-text document.
/// Pages are separated by a form feed; the first page opens with the
/// recipient line, the last closes with the generation date. The header and
/// blank lines count toward the page budget, so the first page holds fewer
/// item lines than the following ones.
pub fn render_shopping_list(
    recipient: &str,
    items: &[ShoppingListItem],
    generated_on: NaiveDate,
    layout: &ReportLayout,
) -> String {
    let lines_per_page = layout.lines_per_page.max(3);

    let mut pages: Vec<String> = Vec::new();
    let mut current: Vec<String> = vec![format!("Shopping list for {recipient}"), String::new()];

    for (index, item) in items.iter().enumerate() {
        if current.len() >= lines_per_page {
            pages.push(current.join("\n"));
            current = Vec::new();
        }
        current.push(format!(
            "{}) {} - {} {}",
            index + 1,
            item.name,
            item.total_amount,
            item.measurement_unit
        ));
    }

    current.push(String::new());
    current.push(format!("Generated on {}", generated_on.format("%d.%m.%Y")));
    pages.push(current.join("\n"));

    pages.join("\u{c}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, unit: &str, total: i64) -> ShoppingListItem {
        ShoppingListItem {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total_amount: total,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[test]
    fn single_page_document() {
        let items = vec![item("flour", "g", 150), item("sugar", "g", 30)];
        let layout = ReportLayout { lines_per_page: 10 };

        let document = render_shopping_list("cook", &items, date(), &layout);
        let lines: Vec<&str> = document.lines().collect();

        assert_eq!(lines[0], "Shopping list for cook");
        assert_eq!(lines[2], "1) flour - 150 g");
        assert_eq!(lines[3], "2) sugar - 30 g");
        assert_eq!(lines.last(), Some(&"Generated on 17.05.2024"));
        assert!(!document.contains('\u{c}'));
    }

    #[test]
    fn long_lists_break_into_pages() {
        let items: Vec<ShoppingListItem> =
            (0..9).map(|n| item(&format!("item{n}"), "g", 1)).collect();
        let layout = ReportLayout { lines_per_page: 5 };

        let document = render_shopping_list("cook", &items, date(), &layout);
        let observed_pages: Vec<&str> = document.split('\u{c}').collect();

        // Header and blank line leave three item slots on the first page.
        assert_eq!(observed_pages.len(), 3);
        assert!(observed_pages[0].contains("3) item2"));
        assert!(!observed_pages[0].contains("4) item3"));
        assert!(observed_pages[1].trim_start().starts_with("4) item3"));
        assert!(observed_pages[2].contains("9) item8"));
        assert!(observed_pages[2].contains("Generated on"));
    }

    #[test]
    fn item_numbering_continues_across_pages() {
        let items: Vec<ShoppingListItem> =
            (0..7).map(|n| item(&format!("item{n}"), "kg", 2)).collect();
        let layout = ReportLayout { lines_per_page: 4 };

        let document = render_shopping_list("cook", &items, date(), &layout);
        assert!(document.contains("7) item6 - 2 kg"));
    }

    #[test]
    fn empty_cart_renders_header_and_footer_only() {
        let layout = ReportLayout::default();
        let document = render_shopping_list("cook", &[], date(), &layout);
        let lines: Vec<&str> = document.lines().collect();

        assert_eq!(lines[0], "Shopping list for cook");
        assert_eq!(lines.last(), Some(&"Generated on 17.05.2024"));
        assert!(lines.iter().all(|line| !line.contains(") ")));
        assert!(!document.contains('\u{c}'));
    }
}
