//! Utils: 日志、地址校验等通用工具

pub mod logger;
pub mod validator;
