pub mod admin;
pub mod courses;
pub mod enrollments;
pub mod lessons;
pub mod modules;
pub mod profiles;
pub mod quizzes;
pub mod webhooks;
