//! Log set-up for harness executables and integration tests.

use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// Initializes the log system. The max log level is determined by the
/// caller (usually from the layout's `log_level` field.) Safe to call
/// from every test in a suite; only the first call installs the
/// subscriber.

pub fn init(level: Level) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Unable to set global default subscriber");
    })
}
