use sqlx::{Pool, Postgres};

use crate::{
    database::error::QueryError,
    database::pagination::PageContext,
    database::schema::{RecipeSummary, SubscribedAuthor, SubscribedAuthorRow, UserProfile, Uuid},
    error::{ApiError, ValidationError},
};

use super::users;

/// Self-subscription is rejected regardless of any other state.
pub fn ensure_not_self(user_id: Uuid, author_id: Uuid) -> Result<(), ValidationError> {
    if user_id == author_id {
        Err(ValidationError::new().field("author", "cannot subscribe to yourself"))
    } else {
        Ok(())
    }
}

pub async fn subscribe(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    ensure_not_self(user_id, author_id)?;

    if users::get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ApiError::NotFound(String::from(
            "no user exists with the specified id",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::single("author", "subscription already exists"));
    }

    users::get_profile(author_id, Some(user_id), pool).await
}

pub async fn unsubscribe(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::api)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from("subscription does not exist")));
    }

    Ok(())
}

/// Authors the caller follows, each enriched with their recipe summaries
/// (optionally truncated to `recipes_limit`) and a total recipe count.
pub async fn list_subscriptions(
    user_id: Uuid,
    recipes_limit: Option<i64>,
    offset: i64,
    page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscribedAuthor>, ApiError> {
    let rows: Vec<SubscribedAuthorRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(QueryError::api)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);

    let mut authors = Vec::with_capacity(rows.len());
    for row in rows {
        // LIMIT NULL means no limit.
        let recipes: Vec<RecipeSummary> = sqlx::query_as(
            "
            SELECT id, name, image, cooking_time
            FROM recipes
            WHERE author_id = $1
            ORDER BY id DESC
            LIMIT $2
        ",
        )
        .bind(row.id)
        .bind(recipes_limit)
        .fetch_all(pool)
        .await
        .map_err(QueryError::api)?;

        authors.push(SubscribedAuthor {
            id: row.id,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: true,
            recipes,
            recipes_count: row.recipes_count,
        });
    }

    Ok(PageContext::from_rows(authors, total_count, page_size, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_subscription_always_fails() {
        let errors = ensure_not_self(7, 7).unwrap_err();
        assert_eq!(errors.messages("author"), ["cannot subscribe to yourself"]);
        assert!(ensure_not_self(7, 8).is_ok());
    }
}
