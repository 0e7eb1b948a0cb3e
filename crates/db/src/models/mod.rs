//! Domain models for the transactional store.
//!
//! These are the validated types handed out by repositories. Row types stay
//! private to the `db` modules that read them.

pub mod cart;
pub mod catalog;
pub mod failed_event;
pub mod interaction;
pub mod order;
pub mod session;
pub mod support;
pub mod user;

pub use cart::{Cart, CartItem, NewCart};
pub use catalog::{Category, NewCategory, NewProduct, Product};
pub use failed_event::FailedEvent;
pub use interaction::{NewProductView, ProductView, WishlistEntry};
pub use order::{Order, OrderItem};
pub use session::{NewSession, Session, Utm};
pub use support::{NewTicket, SATISFACTION_RANGE, SupportTicket, TicketMessage};
pub use user::{
    Address, DefaultAddresses, Demographic, NewAddress, NewDemographic, NewUser, ProfileUpdate,
    User,
};
