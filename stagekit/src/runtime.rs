//! Runtime helpers: panic payload rendering and panic-safe task spawning.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::error;

/// Renders a panic payload as text.
///
/// `panic!` with a literal yields `&'static str`, with format arguments a
/// `String`; anything else is opaque.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Spawns a task whose panic is caught and logged instead of surfacing as a
/// `JoinError`.
///
/// The handle resolves to `None` if the task panicked.
pub fn spawn_guarded<F, T>(name: impl Into<String>, future: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(value) => Some(value),
            Err(payload) => {
                error!(
                    task = %name,
                    panic = %panic_message(&*payload),
                    backtrace = %std::backtrace::Backtrace::force_capture(),
                    "panic happened in guarded task"
                );
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let literal = std::panic::catch_unwind(|| panic!("literal")).unwrap_err();
        assert_eq!(panic_message(&*literal), "literal");

        let formatted = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*formatted), "code 7");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(&*opaque), "<non-string panic payload>");
    }

    #[tokio::test]
    async fn test_spawn_guarded_returns_value() {
        let handle = spawn_guarded("adder", async { 1 + 1 });
        assert_eq!(handle.await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_spawn_guarded_contains_panic() {
        let handle = spawn_guarded("bomb", async {
            panic!("boom");
        });
        let result: Option<()> = handle.await.expect("panic must not reach the JoinHandle");
        assert!(result.is_none());
    }
}
