//! Built-in deployment platforms.

pub mod eks;
pub mod heroku;
pub mod kubernetes;
pub mod local;
pub mod minikube;

pub use eks::EksPlatform;
pub use heroku::HerokuPlatform;
pub use kubernetes::KubernetesOps;
pub use local::{find_free_port, LocalPlatform};
pub use minikube::MinikubePlatform;

use crate::error::{PlatformError, PlatformResult};
use crate::tool::ToolRunner;

/// Fail unless `program` answers its version check.
pub(crate) async fn require_tool(
    runner: &dyn ToolRunner,
    program: &str,
    version_args: &[&str],
    hint: &str,
) -> PlatformResult<()> {
    if runner.is_installed(program, version_args).await {
        Ok(())
    } else {
        Err(PlatformError::ToolNotInstalled {
            program: program.to_string(),
            hint: hint.to_string(),
        })
    }
}
