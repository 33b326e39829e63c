pub mod endpoint;
pub mod push;
pub mod ticket;

pub use endpoint::{Endpoint, InvalidReason, Platform};
pub use push::{OutboundMessage, Priority, PushPayload, Sound};
pub use ticket::{DeliveryFailure, PushErrorCode, Receipt, Ticket, TicketMap};
