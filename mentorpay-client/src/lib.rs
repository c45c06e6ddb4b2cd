pub mod admin;
pub mod auth;
pub mod gateway;
pub mod messaging;
pub mod paging;
pub mod payment;
pub mod refresh;

pub use admin::{AdminActions, NewSession};
pub use auth::{AuthSession, TokenStore};
pub use gateway::{ApiClient, GatewayError, PageMeta, ShapeWarning};
pub use messaging::{run_conversation_refresh, MessagingError, MessagingManager};
pub use paging::{ClientPageSource, ListController, Page, PageQuery, PageSource, ServerPageSource};
pub use payment::{CreatedPayment, FlowState, PaymentFlow, PaymentFlowError};
pub use refresh::{run_refresh_loop, RefreshTrigger, Reconciler, ViewState};
