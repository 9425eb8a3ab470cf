use chrono::Utc;

use crate::actor_framework::Entity;
use crate::domain::{Order, OrderCreate};
use crate::error::StoreError;
use super::actions::{OrderAction, StatusChange};

impl Entity for Order {
    type Id = i64;
    type CreatePayload = OrderCreate;
    type Patch = ();
    type Action = OrderAction;
    type ActionResult = StatusChange;

    const KIND: &'static str = "order";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn from_create(id: i64, payload: OrderCreate) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            user_id: payload.user_id,
            status: payload.status,
            total: payload.total,
            shipping_fee: payload.shipping_fee,
            payment_method: payload.payment_method,
            payment_info_id: payload.payment_info_id,
            draft_id: payload.draft_id,
            created_at: Utc::now(),
        })
    }

    /// Orders only change through [`OrderAction::Apply`].
    fn on_update(&mut self, _patch: ()) -> Result<(), StoreError> {
        Err(StoreError::Rejected(format!("order {} is updated through lifecycle events only", self.id)))
    }

    fn handle_action(&mut self, action: OrderAction) -> Result<StatusChange, StoreError> {
        match action {
            OrderAction::Apply(event) => {
                let from = self.status;
                let to = from.apply(event)?;
                self.status = to;
                Ok(StatusChange { from, to })
            }
        }
    }
}
