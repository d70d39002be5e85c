pub mod twofactor;
