pub use super::admins::Entity as Admins;
