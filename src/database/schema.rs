use serde::{Deserialize, Serialize};

use crate::database::media::ImageInput;

pub type Uuid = i32;

#[derive(
    Clone, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: UserRole,
}

/// Public profile, always carries the viewer-relative subscription flag.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Listing row: recipe columns plus the viewer-relative flags and the
/// window-function total used for pagination.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub count: i64,
}

/// Compact echo returned by the favorite/cart toggles and subscription
/// listings.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeSummary {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedTag {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedIngredient {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientRow {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Full read-back representation, always re-derived from storage.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredientRow>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SubscribedAuthorRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub recipes_count: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribedAuthor {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngredientAmountInput {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub image: ImageInput,
    pub text: String,
    pub cooking_time: i32,
    pub ingredients: Vec<IngredientAmountInput>,
    pub tags: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Listing filters; boolean flags evaluate viewer-relative relations and
/// are matched against an always-false relation for anonymous callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
    pub offset: i64,
}
