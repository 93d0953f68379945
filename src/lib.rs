mod database {
    pub mod actions;
    pub mod error;
    pub mod media;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod config;
mod constants;
mod error;
mod routes;

mod report {
    pub mod document;
}

pub use authentication::*;
pub use config::*;
pub use constants::*;
pub use database::actions;
pub use database::error::*;
pub use database::{media::*, pagination::*, schema::*};
pub use error::*;
pub use report::document::*;
pub use routes::*;
