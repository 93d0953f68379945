pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;

pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MIN_COOKING_TIME: i32 = 1;

pub const REPORT_LINES_PER_PAGE: usize = 21;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_HOURS: i64 = 1;

pub const RESERVED_USERNAMES: &[&str] = &["me"];
