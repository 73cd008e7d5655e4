use super::client::ApiClient;

/// Status code that invalidates the current session
pub const UNAUTHORIZED: u16 = 401;

/// Observer for every response that passes through an [`ApiClient`].
///
/// Runs after the response arrives and before the result is handed back to
/// the caller, regardless of which part of the application issued the
/// request. Implementations must not block.
///
/// `sent` is the `Authorization` header the request carried, which may differ
/// from the client's current one if the credential changed mid-flight.
pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, client: &ApiClient, status: u16, sent: Option<&str>);
}
