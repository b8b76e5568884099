/// Classification for the Request Governor's retry policy.
///
/// Used to determine whether a failed outbound call may be reattempted.
///
/// # Behavior Summary
///
/// | Class | Retried? | Typical sources |
/// |-------|----------|-----------------|
/// | `Never` | No | auth rejections, permission denials, validation failures |
/// | `WithBackoff` | Yes, up to the attempt budget | rate limiting (429), timeouts, upstream 5xx |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the provider rejected the request for a reason that
    /// will not change on a subsequent attempt (bad credentials, invalid
    /// one-time code, revoked token, permission denied).
    Never,

    /// Retry with exponential backoff (base 2^attempt seconds), bounded by
    /// the governor's attempt budget.
    ///
    /// Used for transient signals: the provider rate limited the request,
    /// the request timed out, or the upstream returned a temporary error.
    WithBackoff,
}
