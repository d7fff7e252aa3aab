//! # sfai_context
//!
//! Persistent application context for sfai.
//!
//! This crate owns the two JSON documents that record which platforms and
//! environments an application has been initialized on and which one is
//! currently active.
//!
//! ## Documents
//!
//! - `./.sfai/context.json` - per-project [`ApplicationContext`]
//! - `~/.sfai/apps.json` - cross-project [`GlobalContext`] holding registered
//!   applications and service credential profiles
//!
//! ## Features
//!
//! - **Migration**: legacy flat platform entries are nested under `default`
//! - **Deep merge**: partial provider updates never drop sibling keys
//! - **Resolution**: explicit overrides switch the active selection
//! - **Profiles**: schema-validated credentials per external service
//!
//! ## Example
//!
//! ```rust,no_run
//! use sfai_context::{ContextPaths, ContextStore, Resolver};
//!
//! let store = ContextStore::new(ContextPaths::discover().unwrap());
//! let resolver = Resolver::new(store);
//!
//! // Switch to heroku/default if it is not already active
//! let resolution = resolver.resolve(Some("heroku"), None).unwrap();
//! println!("{}/{}", resolution.platform, resolution.environment);
//! ```

pub mod error;
pub mod merge;
pub mod migration;
pub mod models;
pub mod paths;
pub mod profiles;
pub mod resolve;
pub mod response;
pub mod schema;
pub mod services;
pub mod store;

pub use error::{init_command, ContextError, ContextResult};
pub use merge::deep_merge;
pub use migration::{migrate_document, migrate_platform_map};
pub use models::*;
pub use paths::ContextPaths;
pub use resolve::{Resolution, Resolver};
pub use response::OperationResponse;
pub use schema::{mask_profile, ServiceSchema, ServiceSchemaRegistry};
pub use services::{ConfigService, DEFAULT_PROFILE};
pub use store::{resolve_path, ContextStore};
