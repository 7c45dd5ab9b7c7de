// Business domains
pub mod pomodoro;
