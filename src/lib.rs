pub mod binding;
pub mod buffer;
pub mod config;
pub mod console;
pub mod error;
pub mod handler;
pub mod layer;
pub mod router;
pub mod script;
pub mod testing;

pub use binding::{GameplayTag, InputActionId, InputActionInstance, InputActionValue, InputBindingKey, TriggerEvent};
pub use buffer::{BufferedInputEvent, InputBuffer};
pub use config::InputRouterConfig;
pub use handler::{HandlerInterest, InputHandler, InputIntentEvent};
pub use layer::{ConsumePolicy, InputLayerAsset, InputLayerRegistry};
pub use router::InputRouter;
