pub mod sqlite_category_repository;
pub mod sqlite_process_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_task_repository;

pub use sqlite_category_repository::SqliteCategoryRepository;
pub use sqlite_process_repository::SqliteProcessRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
