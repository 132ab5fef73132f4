pub mod builders;
pub mod recorders;

use std::sync::Once;
use std::time::{Duration, Instant};

use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{ConfigFileBuilder, TaskConfigBuilder};
pub use recorders::{ActionLog, ConcurrencyProbe};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and only shown for failures. The filter
/// comes from `BUILDDAG_LOG` (e.g. `BUILDDAG_LOG=builddag=debug`), falling
/// back to `warn` so passing runs stay quiet.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("BUILDDAG_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Poll `cond` until it holds or `timeout` elapses. Returns the final value.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
