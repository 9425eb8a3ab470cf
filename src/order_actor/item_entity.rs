use crate::actor_framework::Entity;
use crate::domain::{OrderItem, OrderItemCreate};
use crate::error::StoreError;

impl Entity for OrderItem {
    type Id = i64;
    type CreatePayload = OrderItemCreate;
    type Patch = ();
    type Action = ();
    type ActionResult = ();

    const KIND: &'static str = "order item";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn from_create(id: i64, payload: OrderItemCreate) -> Result<Self, StoreError> {
        if payload.quantity <= 0 {
            return Err(StoreError::Rejected(format!("item quantity must be positive, got {}", payload.quantity)));
        }
        Ok(Self {
            id,
            owner: payload.owner,
            product_variant_id: payload.product_variant_id,
            quantity: payload.quantity,
            price: payload.price,
            total_price: payload.price * rust_decimal::Decimal::from(payload.quantity),
        })
    }

    fn on_update(&mut self, _patch: ()) -> Result<(), StoreError> {
        Err(StoreError::Rejected(format!("order item {} is immutable", self.id)))
    }

    fn handle_action(&mut self, _action: ()) -> Result<(), StoreError> {
        Ok(())
    }
}
