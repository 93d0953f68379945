use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};

use crate::constants::{
    MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, RECIPE_COUNT_PER_PAGE, REPORT_LINES_PER_PAGE,
    SUBSCRIPTION_COUNT_PER_PAGE,
};

/// Minimum accepted values for recipe inputs. Passed into validation
/// explicitly so tests can vary the thresholds.
#[derive(Debug, Clone)]
pub struct RecipeLimits {
    pub min_amount: i32,
    pub min_cooking_time: i32,
}

impl Default for RecipeLimits {
    fn default() -> Self {
        Self {
            min_amount: MIN_INGREDIENT_AMOUNT,
            min_cooking_time: MIN_COOKING_TIME,
        }
    }
}

/// Layout policy for the printable shopping list. The header line counts
/// toward the per-page budget.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub lines_per_page: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            lines_per_page: REPORT_LINES_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub limits: RecipeLimits,
    pub report: ReportLayout,
    pub recipe_page_size: i64,
    pub subscription_page_size: i64,
    pub media_dir: PathBuf,
    pub session_secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            limits: RecipeLimits::default(),
            report: ReportLayout::default(),
            recipe_page_size: RECIPE_COUNT_PER_PAGE,
            subscription_page_size: SUBSCRIPTION_COUNT_PER_PAGE,
            media_dir: PathBuf::from("media"),
            session_secret: String::from("secret"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let session_secret = match env::var("KOKKI_SESSION_SECRET") {
            Ok(secret) => secret,
            Err(_) => {
                warn!("KOKKI_SESSION_SECRET not set, using the development default");
                String::from("secret")
            }
        };

        Self {
            limits: RecipeLimits {
                min_amount: try_load("KOKKI_MIN_AMOUNT", MIN_INGREDIENT_AMOUNT),
                min_cooking_time: try_load("KOKKI_MIN_COOKING_TIME", MIN_COOKING_TIME),
            },
            report: ReportLayout {
                lines_per_page: try_load("KOKKI_REPORT_LINES_PER_PAGE", REPORT_LINES_PER_PAGE),
            },
            recipe_page_size: try_load("KOKKI_RECIPE_PAGE_SIZE", RECIPE_COUNT_PER_PAGE),
            subscription_page_size: try_load(
                "KOKKI_SUBSCRIPTION_PAGE_SIZE",
                SUBSCRIPTION_COUNT_PER_PAGE,
            ),
            media_dir: PathBuf::from(try_load(
                "KOKKI_MEDIA_DIR",
                String::from("media"),
            )),
            session_secret,
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("invalid {key} value ({e}), using default: {default}");
                default
            }
        },
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = AppConfig::default();
        assert_eq!(config.limits.min_amount, MIN_INGREDIENT_AMOUNT);
        assert_eq!(config.limits.min_cooking_time, MIN_COOKING_TIME);
        assert_eq!(config.report.lines_per_page, REPORT_LINES_PER_PAGE);
    }
}
