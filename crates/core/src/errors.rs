use thiserror::Error;
use uuid::Uuid;

/// 控制面错误类型定义
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: Uuid },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },

    #[error("任务未处于运行状态: {id}")]
    TaskNotRunning { id: Uuid },

    #[error("进程定义未找到: {name}")]
    ProcessNotFound { name: String },

    #[error("配置分类未找到: {name}")]
    CategoryNotFound { name: String },

    #[error("记录不存在: {0}")]
    DoesNotExist(String),

    #[error("重复的请求: {0}")]
    DuplicateRequest(String),

    #[error("已存在相同地址和端口的服务: {address}:{port}")]
    AlreadyExistsWithTheSameAddressAndPort { address: String, port: u16 },

    #[error("兴趣注册已存在: 服务 {microservice_uuid}, 分类 {category_name}")]
    InterestRegistrationAlreadyExists {
        microservice_uuid: Uuid,
        category_name: String,
    },

    #[error("调度计划 {id} 仍有运行中的任务")]
    ScheduleInUse { id: Uuid },

    #[error("无效的服务类型: {0}")]
    InvalidServiceType(String),

    #[error("无效的端口: {0}")]
    InvalidPort(String),

    #[error("无效的调度计划: {0}")]
    InvalidSchedule(String),

    #[error("调度计划 {id} 的类型不可修改")]
    ScheduleTypeImmutable { id: Uuid },

    #[error("调度器尚未启动")]
    NotReady,

    #[error("调度器已经启动")]
    AlreadyStarted,

    #[error("仍有 {count} 个任务的进程未退出")]
    TasksStillRunning { count: usize },

    #[error("网络错误: {0}")]
    Network(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误分类，供调用方决定如何向外呈现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    State,
    Transient,
    Internal,
}

impl EdgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EdgeError::ScheduleNotFound { .. }
            | EdgeError::TaskNotFound { .. }
            | EdgeError::ProcessNotFound { .. }
            | EdgeError::CategoryNotFound { .. }
            | EdgeError::DoesNotExist(_) => ErrorKind::NotFound,
            EdgeError::DuplicateRequest(_)
            | EdgeError::AlreadyExistsWithTheSameAddressAndPort { .. }
            | EdgeError::InterestRegistrationAlreadyExists { .. }
            | EdgeError::ScheduleInUse { .. } => ErrorKind::Conflict,
            EdgeError::InvalidServiceType(_)
            | EdgeError::InvalidPort(_)
            | EdgeError::InvalidSchedule(_)
            | EdgeError::ScheduleTypeImmutable { .. } => ErrorKind::InvalidInput,
            EdgeError::TaskNotRunning { .. }
            | EdgeError::NotReady
            | EdgeError::AlreadyStarted
            | EdgeError::TasksStillRunning { .. } => ErrorKind::State,
            EdgeError::Network(_) | EdgeError::Timeout(_) => ErrorKind::Transient,
            EdgeError::Database(_)
            | EdgeError::Serialization(_)
            | EdgeError::Configuration(_)
            | EdgeError::TaskExecution(_)
            | EdgeError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(err: serde_json::Error) -> Self {
        EdgeError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type EdgeResult<T> = std::result::Result<T, EdgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            EdgeError::ScheduleNotFound { id: Uuid::new_v4() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EdgeError::AlreadyExistsWithTheSameAddressAndPort {
                address: "localhost".to_string(),
                port: 8081,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EdgeError::InvalidServiceType("Bogus".to_string()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            EdgeError::TaskNotRunning { id: Uuid::new_v4() }.kind(),
            ErrorKind::State
        );
        assert_eq!(
            EdgeError::Timeout("ping".to_string()).kind(),
            ErrorKind::Transient
        );
        assert!(EdgeError::DoesNotExist("service".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = EdgeError::AlreadyExistsWithTheSameAddressAndPort {
            address: "127.0.0.1".to_string(),
            port: 1234,
        };
        assert!(err.to_string().contains("127.0.0.1:1234"));
    }
}
