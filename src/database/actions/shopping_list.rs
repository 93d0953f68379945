use std::collections::BTreeMap;

use sqlx::{Pool, Postgres};

use crate::{
    database::error::QueryError,
    database::schema::{CartIngredientRow, ShoppingListItem, Uuid},
    error::ApiError,
};

/// Every ingredient-amount row contributed by the recipes in the caller's
/// shopping cart.
pub async fn fetch_cart_ingredients(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredientRow>, ApiError> {
    let rows: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_cart sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::api)?;

    Ok(rows)
}

/// Groups the cart rows by (name, unit), sums the amounts across recipes
/// and returns the totals ordered by ingredient name ascending.
pub fn aggregate_shopping_list(rows: Vec<CartIngredientRow>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *totals
            .entry((row.name, row.measurement_unit))
            .or_insert(0) += i64::from(row.amount);
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListItem {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
        CartIngredientRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn sums_across_recipes_and_sorts_by_name() {
        // Cart holds R1 = {flour: 100 g} and R2 = {flour: 50 g, sugar: 30 g}.
        let rows = vec![row("sugar", "g", 30), row("flour", "g", 100), row("flour", "g", 50)];

        let items = aggregate_shopping_list(rows);
        assert_eq!(
            items,
            vec![
                ShoppingListItem {
                    name: String::from("flour"),
                    measurement_unit: String::from("g"),
                    total_amount: 150,
                },
                ShoppingListItem {
                    name: String::from("sugar"),
                    measurement_unit: String::from("g"),
                    total_amount: 30,
                },
            ]
        );
    }

    #[test]
    fn same_name_with_different_units_stays_separate() {
        let rows = vec![row("milk", "ml", 200), row("milk", "l", 1)];
        let items = aggregate_shopping_list(rows);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].measurement_unit, "l");
        assert_eq!(items[1].measurement_unit, "ml");
    }

    #[test]
    fn empty_cart_aggregates_to_nothing() {
        assert!(aggregate_shopping_list(vec![]).is_empty());
    }
}
