use sqlx::{Pool, Postgres};

use crate::{
    database::error::QueryError,
    database::schema::{NewTag, Tag, Uuid},
    error::{ApiError, ValidationError},
};

/// Accepts `#RGB` and `#RRGGBB`.
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let valid = matches!(color.strip_prefix('#'), Some(hex)
        if (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()));

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new().field("color", "color must be a hex value like #RRGGBB"))
    }
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new()
            .field("slug", "slug may only contain lowercase letters, digits, '_' and '-'"))
    }
}

pub fn validate_tag(tag: &NewTag) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    if tag.name.trim().is_empty() {
        errors.push("name", "name must not be empty");
    }
    if let Err(e) = validate_color(&tag.color) {
        errors.merge(e);
    }
    if let Err(e) = validate_slug(&tag.slug) {
        errors.merge(e);
    }
    errors.into_result()
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(list)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(tag)
}

pub async fn create_tag(tag: NewTag, pool: &Pool<Postgres>) -> Result<Tag, ApiError> {
    validate_tag(&tag)?;

    let created: Tag =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *")
            .bind(&tag.name)
            .bind(&tag.color)
            .bind(&tag.slug)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                let e = QueryError::from(e);
                if e.is_unique_violation() {
                    ApiError::single("name", "a tag with this name, color or slug already exists")
                } else {
                    ApiError::from(e)
                }
            })?;

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_hex_colors() {
        assert!(validate_color("#fff").is_ok());
        assert!(validate_color("#00FF7f").is_ok());
        assert!(validate_color("fff").is_err());
        assert!(validate_color("#ffff").is_err());
        assert!(validate_color("#ggg").is_err());
        assert!(validate_color("#").is_err());
    }

    #[test]
    fn slug_character_class() {
        assert!(validate_slug("breakfast").is_ok());
        assert!(validate_slug("low-carb_2").is_ok());
        assert!(validate_slug("Breakfast").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn tag_validation_collects_every_field() {
        let tag = NewTag {
            name: String::from(" "),
            color: String::from("red"),
            slug: String::from("OK"),
        };
        let errors = validate_tag(&tag).unwrap_err();
        assert!(!errors.messages("name").is_empty());
        assert!(!errors.messages("color").is_empty());
        assert!(!errors.messages("slug").is_empty());
    }
}
