mod policy;
mod sampler;
mod window;

pub use policy::PollingPolicy;
pub use sampler::{LiveSampler, LiveSubscription, LiveUpdate};
pub use window::LiveWindow;
