//! 共享库
//!
//! 积分引擎各二进制与库共用的基础设施：配置加载、数据库连接池、可观测性初始化。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
