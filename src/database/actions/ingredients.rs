use sqlx::{Pool, Postgres};

use crate::{
    database::error::QueryError,
    database::schema::{Ingredient, NewIngredient, Uuid},
    error::{ApiError, ValidationError},
};

/// Unpaginated listing with an optional case-insensitive prefix search on
/// the name.
pub async fn list_ingredients(
    search: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let list: Vec<Ingredient> = match search {
        Some(name) => {
            sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name")
                .bind(format!("{name}%"))
                .fetch_all(pool)
                .await
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
                .fetch_all(pool)
                .await
        }
    }
    .map_err(QueryError::api)?;

    Ok(list)
}

pub async fn get_ingredient(
    id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, ApiError> {
    let ingredient: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(ingredient)
}

/// The (name, measurement_unit) pair is unique at the storage layer; a
/// duplicate insert surfaces as a validation error.
pub async fn create_ingredient(
    ingredient: NewIngredient,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, ApiError> {
    let mut errors = ValidationError::new();
    if ingredient.name.trim().is_empty() {
        errors.push("name", "name must not be empty");
    }
    if ingredient.measurement_unit.trim().is_empty() {
        errors.push("measurement_unit", "measurement unit must not be empty");
    }
    errors.into_result()?;

    let created: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(&ingredient.name)
    .bind(&ingredient.measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        let e = QueryError::from(e);
        if e.is_unique_violation() {
            ApiError::single("name", "this ingredient already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(created)
}
