use sqlx::{Pool, Postgres};

use crate::{
    database::error::QueryError,
    database::schema::{RecipeSummary, Uuid},
    error::ApiError,
};

/// Compact representation echoed by the toggle endpoints.
pub async fn get_recipe_summary(
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeSummary>, ApiError> {
    let row: Option<RecipeSummary> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::api)?;

    Ok(row)
}

async fn require_recipe(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<RecipeSummary, ApiError> {
    get_recipe_summary(recipe_id, pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(String::from("no recipe exists with the specified id")))
}

/// The unique (user, recipe) constraint is the sole race guard: of two
/// concurrent identical adds exactly one insert lands, the other sees zero
/// affected rows and reports the duplicate.
pub async fn add_to_favorites(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, ApiError> {
    let summary = require_recipe(recipe_id, pool).await?;

    let result =
        sqlx::query("INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(recipe_id)
            .execute(pool)
            .await
            .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::single("recipe", "recipe is already in favorites"));
    }

    Ok(summary)
}

pub async fn remove_from_favorites(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from("recipe is not in favorites")));
    }

    Ok(())
}

pub async fn add_to_shopping_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, ApiError> {
    let summary = require_recipe(recipe_id, pool).await?;

    let result = sqlx::query(
        "INSERT INTO shopping_cart (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::single(
            "recipe",
            "recipe is already in the shopping cart",
        ));
    }

    Ok(summary)
}

pub async fn remove_from_shopping_cart(
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM shopping_cart WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from(
            "recipe is not in the shopping cart",
        )));
    }

    Ok(())
}
