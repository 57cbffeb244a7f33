pub mod automation_dto;
pub mod telegram_dto;
