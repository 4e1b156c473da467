pub use crate::executor::{JoinHandle, Task};
pub use crate::signal::SimObject;
pub use crate::sim_if::{SimTime, SIM_IF};
pub use crate::trigger::Trigger;
pub use crate::value::Val;
pub use crate::{fail_test, pass_test, TbError, TbResult};
pub use futures::future::FutureExt;
