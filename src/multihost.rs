/// Splits a connection string listing several hosts into one address per host.
///
/// `kafka://a:9092,b:9092/?topic=T` becomes `kafka://a:9092/?topic=T` and
/// `kafka://b:9092/?topic=T`, in host order. Scheme, path and query are
/// copied verbatim.
///
/// The host list must be followed by a `/`. Without a `//` scheme delimiter
/// or without anything after the host list the result is empty.
pub fn expand_multi_host(address: &str) -> Vec<String> {
    let Some(scheme_end) = address.find("//") else {
        return Vec::new();
    };
    let prefix = &address[..scheme_end + 2];
    let after_scheme = &address[scheme_end + 2..];

    let Some((hosts, rest)) = after_scheme.split_once('/') else {
        return Vec::new();
    };

    hosts
        .split(',')
        .map(|host| format!("{prefix}{host}/{rest}"))
        .collect()
}
