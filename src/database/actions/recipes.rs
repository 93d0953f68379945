use std::collections::{HashMap, HashSet};

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::jwt::SessionData,
    authentication::permissions::ActionType,
    config::RecipeLimits,
    database::error::QueryError,
    database::media::MediaStore,
    database::pagination::PageContext,
    database::schema::{
        IngredientAmountInput, LinkedIngredient, LinkedTag, NewRecipe, Recipe, RecipeDetail,
        RecipeFilter, RecipeIngredientRow, RecipeRow, Tag, UserProfile, Uuid,
    },
    error::{ApiError, ValidationError},
};

/// Semantic checks against the configured minimums: cooking time and every
/// amount must reach them (the minimum itself is accepted), and neither the
/// ingredient list nor the tag list may reference the same id twice.
pub fn validate_recipe(payload: &NewRecipe, limits: &RecipeLimits) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();

    if payload.name.trim().is_empty() {
        errors.push("name", "name must not be empty");
    }
    if payload.cooking_time < limits.min_cooking_time {
        errors.push(
            "cooking_time",
            &format!(
                "cooking time cannot be less than {}",
                limits.min_cooking_time
            ),
        );
    }
    if payload.ingredients.is_empty() {
        errors.push("ingredients", "at least one ingredient is required");
    }
    if payload.tags.is_empty() {
        errors.push("tags", "at least one tag is required");
    }

    if payload
        .ingredients
        .iter()
        .any(|part| part.amount < limits.min_amount)
    {
        errors.push(
            "amount",
            &format!("ingredient amount cannot be less than {}", limits.min_amount),
        );
    }

    let unique: HashSet<Uuid> = payload.ingredients.iter().map(|part| part.id).collect();
    if unique.len() != payload.ingredients.len() {
        errors.push("ingredients", "recipe contains duplicate ingredients");
    }

    let unique_tags: HashSet<Uuid> = payload.tags.iter().copied().collect();
    if unique_tags.len() != payload.tags.len() {
        errors.push("tags", "recipe contains duplicate tags");
    }

    errors.into_result()
}

async fn ensure_ingredients_exist(ids: Vec<Uuid>, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let found: Vec<(Uuid,)> =
        sqlx::query_as("SELECT DISTINCT id FROM ingredients WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(pool)
            .await
            .map_err(QueryError::api)?;

    if found.len() != ids.len() {
        return Err(ApiError::NotFound(String::from(
            "a referenced ingredient does not exist",
        )));
    }
    Ok(())
}

async fn ensure_tags_exist(ids: Vec<Uuid>, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let found: Vec<(Uuid,)> = sqlx::query_as("SELECT DISTINCT id FROM tags WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::api)?;

    if found.len() != ids.len() {
        return Err(ApiError::NotFound(String::from(
            "a referenced tag does not exist",
        )));
    }
    Ok(())
}

async fn insert_ingredient_rows(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    parts: &[IngredientAmountInput],
) -> Result<(), ApiError> {
    let mut query =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query.push_values(parts, |mut row, part| {
        row.push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });
    query
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::api)?;

    Ok(())
}

async fn insert_tag_rows(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), ApiError> {
    let mut query = QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query.push_values(tag_ids, |mut row, tag_id| {
        row.push_bind(recipe_id).push_bind(*tag_id);
    });
    query
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::api)?;

    Ok(())
}

/// Persists a recipe with its ingredient amounts and tag links as one
/// atomic unit.
pub async fn create_recipe(
    author_id: Uuid,
    payload: NewRecipe,
    limits: &RecipeLimits,
    media: &MediaStore,
    pool: &Pool<Postgres>,
) -> Result<Uuid, ApiError> {
    validate_recipe(&payload, limits)?;
    ensure_ingredients_exist(payload.ingredients.iter().map(|p| p.id).collect(), pool).await?;
    ensure_tags_exist(payload.tags.clone(), pool).await?;

    let image = media.store_image(payload.image.clone())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| ApiError::from(QueryError::new(String::from("could not start transaction"))))?;

    let row: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&payload.name)
    .bind(&image)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::api)?;

    let recipe_id = row.0;
    insert_ingredient_rows(&mut tr, recipe_id, &payload.ingredients).await?;
    insert_tag_rows(&mut tr, recipe_id, &payload.tags).await?;

    tr.commit()
        .await
        .map_err(|_| ApiError::from(QueryError::new(String::from("could not commit transaction"))))?;

    Ok(recipe_id)
}

/// Updates the recipe row and fully replaces its ingredient-amount rows and
/// tag links (delete-all-then-insert, never a diff) in one transaction.
/// Concurrent editors are last-writer-wins.
pub async fn update_recipe(
    id: Uuid,
    session: &SessionData,
    payload: NewRecipe,
    limits: &RecipeLimits,
    media: &MediaStore,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    get_recipe_mut(id, session, pool).await?;
    validate_recipe(&payload, limits)?;
    ensure_ingredients_exist(payload.ingredients.iter().map(|p| p.id).collect(), pool).await?;
    ensure_tags_exist(payload.tags.clone(), pool).await?;

    let image = media.store_image(payload.image.clone())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| ApiError::from(QueryError::new(String::from("could not start transaction"))))?;

    sqlx::query("UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5")
        .bind(&payload.name)
        .bind(&image)
        .bind(&payload.text)
        .bind(payload.cooking_time)
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::api)?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::api)?;
    insert_ingredient_rows(&mut tr, id, &payload.ingredients).await?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::api)?;
    insert_tag_rows(&mut tr, id, &payload.tags).await?;

    tr.commit()
        .await
        .map_err(|_| ApiError::from(QueryError::new(String::from("could not commit transaction"))))?;

    Ok(())
}

/// Cascades remove the amount rows, tag links, favorites and cart entries.
pub async fn delete_recipe(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(())
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(row)
}

/// Fetches a recipe for mutation: the caller must be its author, unless
/// they hold the manage-all permission.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let recipe = get_recipe(id, pool).await?;
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) => {
                if recipe.author_id != session.user_id {
                    Err(ApiError::PermissionDenied(String::from(
                        "you can only manage your own recipes",
                    )))
                } else {
                    Ok(recipe)
                }
            }
        },
        None => Err(ApiError::NotFound(String::from(
            "no recipe exists with the specified id",
        ))),
    }
}

/// Read-back representation, re-derived from current storage.
pub async fn get_recipe_detail(
    id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ApiError> {
    let row: Option<RecipeRow> = sqlx::query_as(
        "
        SELECT r.id, r.author_id, r.name, r.image, r.text, r.cooking_time,
            EXISTS(SELECT 1 FROM favorites f
                   WHERE f.recipe_id = r.id AND f.user_id = $2) AS is_favorited,
            EXISTS(SELECT 1 FROM shopping_cart sc
                   WHERE sc.recipe_id = r.id AND sc.user_id = $2) AS is_in_shopping_cart,
            COUNT(*) OVER() AS count
        FROM recipes r
        WHERE r.id = $1
    ",
    )
    .bind(id)
    .bind(viewer)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::api)?;

    let row =
        row.ok_or_else(|| ApiError::NotFound(String::from("no recipe exists with the specified id")))?;

    let mut details = load_recipe_details(vec![row], viewer, pool).await?;
    details
        .pop()
        .ok_or_else(|| ApiError::Internal(String::from("recipe detail assembly produced no rows")))
}

/// Paginated, filtered listing. Both relationship flags are computed inside
/// the listing query with one membership check each; the anonymous viewer
/// binds NULL so they evaluate false.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeDetail>, ApiError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, \
         EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
    );
    query.push_bind(viewer);
    query.push(
        ") AS is_favorited, \
         EXISTS(SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ",
    );
    query.push_bind(viewer);
    query.push(") AS is_in_shopping_cart, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ");
        query.push_bind(author);
    }
    if !filter.tags.is_empty() {
        query.push(
            " AND EXISTS(SELECT 1 FROM recipe_tags rt \
             INNER JOIN tags t ON t.id = rt.tag_id \
             WHERE rt.recipe_id = r.id AND t.slug = ANY(",
        );
        query.push_bind(filter.tags.clone());
        query.push("))");
    }
    if let Some(wanted) = filter.is_favorited {
        query.push(if wanted { " AND " } else { " AND NOT " });
        query.push("EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ");
        query.push_bind(viewer);
        query.push(")");
    }
    if let Some(wanted) = filter.is_in_shopping_cart {
        query.push(if wanted { " AND " } else { " AND NOT " });
        query.push(
            "EXISTS(SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ",
        );
        query.push_bind(viewer);
        query.push(")");
    }

    query.push(" ORDER BY r.id DESC LIMIT ");
    query.push_bind(page_size);
    query.push(" OFFSET ");
    query.push_bind(filter.offset);

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::api)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let details = load_recipe_details(rows, viewer, pool).await?;

    Ok(PageContext::from_rows(
        details,
        total_count,
        page_size,
        filter.offset,
    ))
}

/// Joins the flat listing rows with their tags, ingredient amounts and
/// author profiles using three batch queries, then groups in memory.
async fn load_recipe_details(
    rows: Vec<RecipeRow>,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ApiError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let author_ids: Vec<Uuid> = rows
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let tags: Vec<LinkedTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::api)?;

    let ingredients: Vec<LinkedIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::api)?;

    let authors: Vec<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS(SELECT 1 FROM subscriptions s
                   WHERE s.user_id = $2 AND s.author_id = u.id) AS is_subscribed
        FROM users u
        WHERE u.id = ANY($1)
    ",
    )
    .bind(&author_ids)
    .bind(viewer)
    .fetch_all(pool)
    .await
    .map_err(QueryError::api)?;

    let mut tags_by_recipe: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for tag in tags {
        tags_by_recipe.entry(tag.recipe_id).or_default().push(Tag {
            id: tag.id,
            name: tag.name,
            color: tag.color,
            slug: tag.slug,
        });
    }

    let mut ingredients_by_recipe: HashMap<Uuid, Vec<RecipeIngredientRow>> = HashMap::new();
    for part in ingredients {
        ingredients_by_recipe
            .entry(part.recipe_id)
            .or_default()
            .push(RecipeIngredientRow {
                id: part.id,
                name: part.name,
                measurement_unit: part.measurement_unit,
                amount: part.amount,
            });
    }

    let authors_by_id: HashMap<Uuid, UserProfile> =
        authors.into_iter().map(|a| (a.id, a)).collect();

    rows.into_iter()
        .map(|row| {
            let author = authors_by_id
                .get(&row.author_id)
                .cloned()
                .ok_or_else(|| ApiError::Internal(String::from("recipe author row missing")))?;

            Ok(RecipeDetail {
                id: row.id,
                tags: tags_by_recipe.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: ingredients_by_recipe.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::media::ImageInput;

    fn limits() -> RecipeLimits {
        RecipeLimits {
            min_amount: 1,
            min_cooking_time: 1,
        }
    }

    fn payload(cooking_time: i32, ingredients: Vec<IngredientAmountInput>) -> NewRecipe {
        NewRecipe {
            name: String::from("Pancakes"),
            image: ImageInput::RawBytes {
                bytes: vec![0],
                extension: String::from("png"),
            },
            text: String::from("Mix and fry."),
            cooking_time,
            ingredients,
            tags: vec![1],
        }
    }

    fn part(id: Uuid, amount: i32) -> IngredientAmountInput {
        IngredientAmountInput { id, amount }
    }

    #[test]
    fn minimum_values_are_accepted() {
        assert!(validate_recipe(&payload(1, vec![part(1, 1)]), &limits()).is_ok());
    }

    #[test]
    fn below_minimum_is_rejected() {
        let errors = validate_recipe(&payload(0, vec![part(1, 0)]), &limits()).unwrap_err();
        assert!(!errors.messages("cooking_time").is_empty());
        assert!(!errors.messages("amount").is_empty());
    }

    #[test]
    fn thresholds_come_from_configuration() {
        let strict = RecipeLimits {
            min_amount: 10,
            min_cooking_time: 5,
        };
        assert!(validate_recipe(&payload(5, vec![part(1, 10)]), &strict).is_ok());
        assert!(validate_recipe(&payload(4, vec![part(1, 10)]), &strict).is_err());
        assert!(validate_recipe(&payload(5, vec![part(1, 9)]), &strict).is_err());
    }

    #[test]
    fn duplicate_ingredients_are_rejected() {
        let errors =
            validate_recipe(&payload(10, vec![part(1, 2), part(2, 3), part(1, 4)]), &limits())
                .unwrap_err();
        assert_eq!(
            errors.messages("ingredients"),
            ["recipe contains duplicate ingredients"]
        );
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let mut recipe = payload(10, vec![part(1, 2)]);
        recipe.tags = vec![1, 1];
        let errors = validate_recipe(&recipe, &limits()).unwrap_err();
        assert_eq!(errors.messages("tags"), ["recipe contains duplicate tags"]);

        recipe.tags = vec![1, 2];
        assert!(validate_recipe(&recipe, &limits()).is_ok());
    }

    #[test]
    fn empty_ingredients_and_tags_are_rejected() {
        let mut recipe = payload(10, vec![]);
        recipe.tags.clear();
        let errors = validate_recipe(&recipe, &limits()).unwrap_err();
        assert!(!errors.messages("ingredients").is_empty());
        assert!(!errors.messages("tags").is_empty());
    }
}
