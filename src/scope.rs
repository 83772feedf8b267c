use regex::Regex;
use tracing::warn;

/// Scope that puts a subscriber in scope for every event.
pub const MATCH_ALL: &str = "*";

/// Returns `true` when an event with `event_scope` should reach a subscriber
/// registered with `subscriber_scope`.
///
/// The subscriber scope is a regular expression searched anywhere in the
/// event scope. `*` is accepted as shorthand for "everything". A pattern that
/// does not compile never matches; the compile error is logged.
pub fn is_in_scope(subscriber_scope: &str, event_scope: &str) -> bool {
    let pattern = if subscriber_scope == MATCH_ALL {
        ".*".to_string()
    } else {
        subscriber_scope.to_string()
    };

    match Regex::new(&pattern) {
        Ok(regex) => regex.is_match(event_scope),
        Err(err) => {
            warn!(
                subscriber_scope,
                event_scope,
                error = %err,
                "scope pattern does not compile; treating subscriber as out of scope"
            );
            false
        }
    }
}
