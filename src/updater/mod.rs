mod adam;
mod gradient_descent;
mod gradient_descent_with_momentum;
mod updater;

pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use updater::{Assign, FnUpdater, Sum, Updater, UpdaterFactory};
