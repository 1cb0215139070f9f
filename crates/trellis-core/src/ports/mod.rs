//! Ports - 抽象化レイヤー
//!
//! 外部システム（時刻、ID 生成、外部 lookup サービス）への
//! インターフェースを trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod enrichment;
pub mod id_generator;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::enrichment::{Enrichment, EnrichmentSource, LookupError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
