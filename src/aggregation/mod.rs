mod round;
mod waiter;

pub(crate) use round::Round;
pub(crate) use waiter::{Waiter, deliver};
