//! METRICFLOW 도메인 모델.
//!
//! 메트릭 서버와 클라이언트가 공유하는 데이터 구조체를 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod connection;
pub mod metric;
pub mod subscription;
pub mod wire;
