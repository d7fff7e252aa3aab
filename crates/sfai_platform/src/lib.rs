//! # sfai_platform
//!
//! Deployment platforms for sfai applications.
//!
//! Each platform wraps the command-line tools of its target and reports
//! configuration changes back to [`AppOperations`], which owns every write
//! to the application context.
//!
//! ## Platforms
//!
//! - **local**: Docker container on this machine
//! - **minikube**: local Kubernetes via Helm
//! - **eks**: existing AWS EKS cluster with images in ECR
//! - **heroku**: git push or container registry deploys
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sfai_context::{ContextPaths, ContextStore};
//! use sfai_platform::{AppOperations, PlatformRegistry, SystemToolRunner};
//!
//! # async fn example() {
//! let store = ContextStore::new(ContextPaths::discover().unwrap());
//! let registry = PlatformRegistry::builtin(Arc::new(SystemToolRunner::new()));
//! let ops = AppOperations::new(store, registry);
//!
//! let response = ops.status(Some("heroku"), None).await;
//! println!("{}", response.message.unwrap_or_default());
//! # }
//! ```

pub mod error;
pub mod mock;
pub mod ops;
pub mod platform;
pub mod providers;
pub mod registry;
pub mod tool;

pub use error::{PlatformError, PlatformResult};
pub use mock::MockToolRunner;
pub use ops::AppOperations;
pub use platform::{DeployOptions, InitOptions, OpenOptions, Platform, PlatformOutcome, APP_PORT};
pub use providers::{EksPlatform, HerokuPlatform, KubernetesOps, LocalPlatform, MinikubePlatform};
pub use registry::PlatformRegistry;
pub use tool::{SystemToolRunner, ToolCommand, ToolOutput, ToolRunner};
