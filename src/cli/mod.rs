pub mod cleanup;
pub mod doctor;
pub mod inspect;
pub mod list;
