//! Build-time identity of the operator and its images.

/// Operator version; also the tag of the images it deploys by default.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default image repository, overridable at build time with
/// `FAULTINJECTOR_IMAGE_REPO`.
pub const IMAGE_REPO: &str = match option_env!("FAULTINJECTOR_IMAGE_REPO") {
    Some(repo) => repo,
    None => "gcr.io/puppet-panda-dev",
};
