//! `rover-hal` – the hardware edge of the control core.
//!
//! # Modules
//!
//! - [`joystick`] – [`JoystickMapper`][joystick::JoystickMapper]: deadzone
//!   filtering and differential mixing of operator joystick axes into a
//!   [`DriveCommand`][rover_types::DriveCommand].
//! - [`steering`] – [`SteeringController`][steering::SteeringController]:
//!   proportional–derivative controller that turns a tag bearing into an
//!   angular drive component.
//! - [`sim`] – [`SimArena`][sim::SimArena]: a kinematic arena that stands in
//!   for the real sensor drivers so the whole stack runs without hardware.

pub mod joystick;
pub mod sim;
pub mod steering;

pub use joystick::{JoystickAxes, JoystickMapper};
pub use sim::SimArena;
pub use steering::SteeringController;
