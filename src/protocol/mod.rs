// Protocol abstraction over heterogeneous remote package sources

pub mod git_host;
pub mod wiki;

pub use git_host::{FramagitUrls, GitHostProtocol, GithubUrls};
pub use wiki::WikiProtocol;

use crate::host::Host;
use crate::package::{InstallResult, Package};
use async_trait::async_trait;
use thiserror::Error;

/// Raised when the source registry names a protocol this build does not
/// implement. A configuration contract violation: surfaces to the
/// operator instead of being absorbed.
#[derive(Debug, Error)]
#[error("Unsupported protocol: '{0}'")]
pub struct UnsupportedProtocol(pub String);

/// One remote catalog protocol. Every variant implements the full
/// operation set; operations that do not apply (e.g. macro update) are
/// explicit no-ops rather than missing methods.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Enumerate installable modules. Empty for macro-only protocols.
    async fn get_mod_list(&self, host: &Host) -> Vec<Package>;

    /// Enumerate installable macros. Empty for module-only protocols.
    async fn get_macro_list(&self, host: &Host) -> Vec<Package>;

    async fn install_mod(&self, host: &Host, pkg: &mut Package) -> InstallResult;

    /// Install and update share one idempotent path for modules.
    async fn update_mod(&self, host: &Host, pkg: &mut Package) -> InstallResult {
        self.install_mod(host, pkg).await
    }

    async fn install_macro(&self, host: &Host, pkg: &mut Package) -> InstallResult;

    /// Macros are not versioned incrementally; re-install is the update
    /// path, so this is a no-op by default.
    async fn update_macro(&self, _host: &Host, _pkg: &mut Package) -> InstallResult {
        InstallResult {
            ok: true,
            ..InstallResult::default()
        }
    }
}
