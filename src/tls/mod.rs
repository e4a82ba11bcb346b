// Certificate extraction: config source, PEM writer, renewal coordinator and its triggers

pub mod coordinator;
pub mod expiry;
pub mod renewal;
pub mod signals;
pub mod source;
pub mod watcher;
pub mod writer;

pub use coordinator::{Evaluation, Phase, RenewalCoordinator, Trigger};
pub use renewal::ExpiryClock;
pub use signals::{SignalTrap, SignalType};
pub use source::{ConfigSnapshot, ConfigSource, JsonConfigSource, Marker};
pub use watcher::ChangeDetector;
pub use writer::{CertificateWriter, PemFileWriter};
