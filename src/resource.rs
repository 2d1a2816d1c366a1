//! Cache resource definitions.
//!
//! A resource is a named kind of cached payload (a catalog page, a
//! profile summary, a computed report) with its own key template, scope
//! resolution, and base TTL. Definitions are compile-time: one type per
//! resource, consumed generically by the strategy layer.

/// Static definition of one cached payload kind.
///
/// `base_key` must encode every parameter that distinguishes one cached
/// instance from another (pagination, filters, owner ids). `scope_key`
/// names the logical owner shared by many parameterizations, so a single
/// scope bump can orphan all of them; return `None` for resources without
/// an owner (they version under a global scope marker).
///
/// # Example
///
/// ```
/// use cache_steward::resource::CacheResource;
///
/// struct AchievementsPage;
///
/// pub struct AchievementsPageParams {
///     pub profile_id: String,
///     pub page: u32,
///     pub page_size: u32,
/// }
///
/// impl CacheResource for AchievementsPage {
///     type Params = AchievementsPageParams;
///
///     fn name() -> &'static str {
///         "achievementsPage"
///     }
///
///     fn base_key(params: &Self::Params) -> String {
///         format!(
///             "achievements:{}:p:{}:s:{}",
///             params.profile_id, params.page, params.page_size
///         )
///     }
///
///     fn scope_key(params: &Self::Params) -> Option<String> {
///         Some(params.profile_id.clone())
///     }
///
///     fn base_ttl_seconds() -> u64 {
///         300
///     }
/// }
/// ```
pub trait CacheResource {
    /// Parameters selecting one cached instance of this resource.
    type Params;

    /// Stable resource name, used for version counters, TTL overrides,
    /// and mutation tracking.
    fn name() -> &'static str;

    /// Build the unversioned portion of the cache key.
    fn base_key(params: &Self::Params) -> String;

    /// Resolve the owning scope, or `None` for unscoped resources.
    fn scope_key(_params: &Self::Params) -> Option<String> {
        None
    }

    /// Default TTL in seconds, overridable per deployment via
    /// `EngineConfig::ttl_overrides`.
    fn base_ttl_seconds() -> u64;
}
