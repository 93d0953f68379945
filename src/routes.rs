use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Local;
use log::info;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::{Pool, Postgres};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::authentication::jwt::SessionData;
use crate::authentication::middleware::{with_possible_session, with_session};
use crate::authentication::permissions::ActionType;
use crate::config::AppConfig;
use crate::constants::SESSION_COOKIE;
use crate::database::actions::{
    favorites, ingredients, recipes, shopping_list, subscriptions, tags, users,
};
use crate::database::media::MediaStore;
use crate::database::schema::{Credentials, NewIngredient, NewRecipe, NewTag, NewUser, RecipeFilter, Uuid};
use crate::error::{recover_rejection, ApiError};
use crate::report::document::render_shopping_list;

const BODY_LIMIT: u64 = 64 * 1024;
// Recipe payloads may carry an inline base64 image.
const RECIPE_BODY_LIMIT: u64 = 8 * 1024 * 1024;

#[derive(Clone)]
struct Context {
    pool: Pool<Postgres>,
    config: Arc<AppConfig>,
    media: Arc<MediaStore>,
}

fn with_ctx(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// Query string for the recipe listing. Parsed by hand because `tags` may be
/// given multiple times (and additionally comma-separated).
fn parse_recipe_filter(query: &str) -> RecipeFilter {
    let mut filter = RecipeFilter::default();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "author" => filter.author = value.parse().ok(),
            "tags" => filter.tags.extend(
                value
                    .split(',')
                    .filter(|slug| !slug.is_empty())
                    .map(str::to_string),
            ),
            "is_favorited" => filter.is_favorited = parse_bool(value),
            "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_bool(value),
            "offset" => filter.offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    filter
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

// The fallback arm cannot fail, so the combined filter is infallible.
fn raw_query() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

fn recipe_body() -> impl Filter<Extract = (NewRecipe,), Error = Rejection> + Clone {
    warp::body::content_length_limit(RECIPE_BODY_LIMIT).and(warp::body::json())
}

#[derive(Debug, Deserialize)]
struct IngredientQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionQuery {
    recipes_limit: Option<String>,
    offset: Option<String>,
}

pub fn routes(
    pool: Pool<Postgres>,
    config: AppConfig,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let ctx = Context {
        media: Arc::new(MediaStore::new(config.media_dir.clone())),
        config: Arc::new(config),
        pool,
    };
    let secret = ctx.config.session_secret.clone();

    let list_tags = warp::path!("tags")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(list_tags_handler);
    let retrieve_tag = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(retrieve_tag_handler);
    let create_tag = warp::path!("tags")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(create_tag_handler);

    let list_ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<IngredientQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(list_ingredients_handler);
    let retrieve_ingredient = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(retrieve_ingredient_handler);
    let create_ingredient = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(create_ingredient_handler);

    let download_shopping_cart = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(download_shopping_cart_handler);
    let list_recipes = warp::path!("recipes")
        .and(warp::get())
        .and(raw_query())
        .and(with_possible_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(list_recipes_handler);
    let retrieve_recipe = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(with_possible_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(retrieve_recipe_handler);
    let create_recipe = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(recipe_body())
        .and(with_ctx(ctx.clone()))
        .and_then(create_recipe_handler);
    let update_recipe = warp::path!("recipes" / Uuid)
        .and(warp::patch())
        .and(with_session(secret.clone()))
        .and(recipe_body())
        .and(with_ctx(ctx.clone()))
        .and_then(update_recipe_handler);
    let delete_recipe = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(delete_recipe_handler);

    let add_favorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(add_favorite_handler);
    let remove_favorite = warp::path!("recipes" / Uuid / "favorite")
        .and(warp::delete())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(remove_favorite_handler);
    let add_to_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(add_to_cart_handler);
    let remove_from_cart = warp::path!("recipes" / Uuid / "shopping_cart")
        .and(warp::delete())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(remove_from_cart_handler);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(register_handler);
    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(login_handler);
    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(me_handler);
    let list_subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_session(secret.clone()))
        .and(warp::query::<SubscriptionQuery>())
        .and(with_ctx(ctx.clone()))
        .and_then(list_subscriptions_handler);
    let retrieve_user = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(with_possible_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(retrieve_user_handler);
    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(with_session(secret.clone()))
        .and(with_ctx(ctx.clone()))
        .and_then(subscribe_handler);
    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(with_session(secret))
        .and(with_ctx(ctx))
        .and_then(unsubscribe_handler);

    list_tags
        .or(create_tag)
        .or(retrieve_tag)
        .or(list_ingredients)
        .or(create_ingredient)
        .or(retrieve_ingredient)
        .or(download_shopping_cart)
        .or(list_recipes)
        .or(create_recipe)
        .or(add_favorite)
        .or(remove_favorite)
        .or(add_to_cart)
        .or(remove_from_cart)
        .or(retrieve_recipe)
        .or(update_recipe)
        .or(delete_recipe)
        .or(register)
        .or(login)
        .or(me)
        .or(list_subscriptions)
        .or(subscribe)
        .or(unsubscribe)
        .or(retrieve_user)
}

pub async fn serve(addr: impl Into<SocketAddr>, pool: Pool<Postgres>, config: AppConfig) {
    let addr = addr.into();
    info!("listening on {addr}");
    warp::serve(routes(pool, config).recover(recover_rejection))
        .run(addr)
        .await;
}

async fn list_tags_handler(ctx: Context) -> Result<impl Reply, Rejection> {
    let tags = tags::list_tags(&ctx.pool).await?;
    Ok(warp::reply::json(&tags))
}

async fn retrieve_tag_handler(id: Uuid, ctx: Context) -> Result<impl Reply, Rejection> {
    let tag = tags::get_tag(id, &ctx.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(String::from("no tag exists with the specified id")))?;
    Ok(warp::reply::json(&tag))
}

async fn create_tag_handler(
    session: SessionData,
    tag: NewTag,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let created = tags::create_tag(tag, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&created),
        StatusCode::CREATED,
    ))
}

async fn list_ingredients_handler(
    query: IngredientQuery,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let list = ingredients::list_ingredients(query.name.as_deref(), &ctx.pool).await?;
    Ok(warp::reply::json(&list))
}

async fn retrieve_ingredient_handler(id: Uuid, ctx: Context) -> Result<impl Reply, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &ctx.pool).await?.ok_or_else(|| {
        ApiError::NotFound(String::from("no ingredient exists with the specified id"))
    })?;
    Ok(warp::reply::json(&ingredient))
}

async fn create_ingredient_handler(
    session: SessionData,
    ingredient: NewIngredient,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let created = ingredients::create_ingredient(ingredient, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&created),
        StatusCode::CREATED,
    ))
}

async fn list_recipes_handler(
    query: String,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let filter = parse_recipe_filter(&query);
    let viewer = session.map(|s| s.user_id);
    let page =
        recipes::fetch_recipes(&filter, viewer, ctx.config.recipe_page_size, &ctx.pool).await?;
    Ok(warp::reply::json(&page))
}

async fn retrieve_recipe_handler(
    id: Uuid,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let detail = recipes::get_recipe_detail(id, viewer, &ctx.pool).await?;
    Ok(warp::reply::json(&detail))
}

async fn create_recipe_handler(
    session: SessionData,
    payload: NewRecipe,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::CreateRecipes)?;
    let id = recipes::create_recipe(
        session.user_id,
        payload,
        &ctx.config.limits,
        &ctx.media,
        &ctx.pool,
    )
    .await?;

    // The response is re-derived from storage, never from the payload.
    let detail = recipes::get_recipe_detail(id, Some(session.user_id), &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&detail),
        StatusCode::CREATED,
    ))
}

async fn update_recipe_handler(
    id: Uuid,
    session: SessionData,
    payload: NewRecipe,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    recipes::update_recipe(
        id,
        &session,
        payload,
        &ctx.config.limits,
        &ctx.media,
        &ctx.pool,
    )
    .await?;

    let detail = recipes::get_recipe_detail(id, Some(session.user_id), &ctx.pool).await?;
    Ok(warp::reply::json(&detail))
}

async fn delete_recipe_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    recipes::delete_recipe(id, &session, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn add_favorite_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    let summary = favorites::add_to_favorites(id, session.user_id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&summary),
        StatusCode::CREATED,
    ))
}

async fn remove_favorite_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnFavorites)?;
    favorites::remove_from_favorites(id, session.user_id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn add_to_cart_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;
    let summary = favorites::add_to_shopping_cart(id, session.user_id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&summary),
        StatusCode::CREATED,
    ))
}

async fn remove_from_cart_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;
    favorites::remove_from_shopping_cart(id, session.user_id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply(),
        StatusCode::NO_CONTENT,
    ))
}

async fn download_shopping_cart_handler(
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let rows = shopping_list::fetch_cart_ingredients(session.user_id, &ctx.pool).await?;
    let items = shopping_list::aggregate_shopping_list(rows);
    let document = render_shopping_list(
        &session.username,
        &items,
        Local::now().date_naive(),
        &ctx.config.report,
    );

    info!(
        "generated shopping list for {} ({} items)",
        session.username,
        items.len()
    );
    Ok(warp::reply::with_header(
        warp::reply::with_header(document, "content-type", "text/plain; charset=utf-8"),
        "content-disposition",
        "attachment; filename=\"shopping_list.txt\"",
    ))
}

async fn register_handler(payload: NewUser, ctx: Context) -> Result<impl Reply, Rejection> {
    let profile = users::register_user(payload, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&profile),
        StatusCode::CREATED,
    ))
}

async fn login_handler(credentials: Credentials, ctx: Context) -> Result<impl Reply, Rejection> {
    let token = users::login_user(
        &credentials.email,
        &credentials.password,
        &ctx.config.session_secret,
        &ctx.pool,
    )
    .await?;

    let body = warp::reply::json(&serde_json::json!({ "auth_token": token }));
    Ok(warp::reply::with_header(
        body,
        "set-cookie",
        format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/"),
    ))
}

async fn me_handler(session: SessionData, ctx: Context) -> Result<impl Reply, Rejection> {
    let profile = users::get_profile(session.user_id, Some(session.user_id), &ctx.pool).await?;
    Ok(warp::reply::json(&profile))
}

async fn retrieve_user_handler(
    id: Uuid,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let profile = users::get_profile(id, viewer, &ctx.pool).await?;
    Ok(warp::reply::json(&profile))
}

async fn list_subscriptions_handler(
    session: SessionData,
    query: SubscriptionQuery,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    // Non-numeric values are treated as absent.
    let recipes_limit = query.recipes_limit.and_then(|v| v.parse().ok());
    let offset = query.offset.and_then(|v| v.parse().ok()).unwrap_or(0);

    let page = subscriptions::list_subscriptions(
        session.user_id,
        recipes_limit,
        offset,
        ctx.config.subscription_page_size,
        &ctx.pool,
    )
    .await?;
    Ok(warp::reply::json(&page))
}

async fn subscribe_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let author = subscriptions::subscribe(session.user_id, id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&author),
        StatusCode::CREATED,
    ))
}

async fn unsubscribe_handler(
    id: Uuid,
    session: SessionData,
    ctx: Context,
) -> Result<impl Reply, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    subscriptions::unsubscribe(session.user_id, id, &ctx.pool).await?;
    Ok(warp::reply::with_status(
        warp::reply(),
        StatusCode::NO_CONTENT,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parses_every_supported_key() {
        let filter = parse_recipe_filter(
            "author=3&tags=breakfast&tags=vegan,quick&is_favorited=1&is_in_shopping_cart=false&offset=12",
        );
        assert_eq!(filter.author, Some(3));
        assert_eq!(filter.tags, ["breakfast", "vegan", "quick"]);
        assert_eq!(filter.is_favorited, Some(true));
        assert_eq!(filter.is_in_shopping_cart, Some(false));
        assert_eq!(filter.offset, 12);
    }

    #[test]
    fn empty_query_means_no_filters() {
        assert_eq!(parse_recipe_filter(""), RecipeFilter::default());
    }

    #[test]
    fn unknown_keys_and_junk_values_are_ignored() {
        let filter = parse_recipe_filter("page=2&author=abc&is_favorited=maybe&tags=");
        assert_eq!(filter.author, None);
        assert_eq!(filter.is_favorited, None);
        assert!(filter.tags.is_empty());
    }

    #[tokio::test]
    async fn raw_query_passes_through_or_defaults_to_empty() {
        let filter = raw_query();

        let query = warp::test::request()
            .path("/recipes?tags=vegan&tags=quick")
            .filter(&filter)
            .await
            .unwrap();
        assert_eq!(query, "tags=vegan&tags=quick");

        let empty = warp::test::request()
            .path("/recipes")
            .filter(&filter)
            .await
            .unwrap();
        assert_eq!(empty, "");
    }
}
