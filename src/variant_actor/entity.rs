use crate::actor_framework::Entity;
use crate::domain::{ProductVariant, VariantCreate, VariantPatch};
use crate::error::StoreError;
use super::actions::{VariantAction, VariantActionResult};

impl Entity for ProductVariant {
    type Id = i64;
    type CreatePayload = VariantCreate;
    type Patch = VariantPatch;
    type Action = VariantAction;
    type ActionResult = VariantActionResult;

    const KIND: &'static str = "variant";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn from_create(id: i64, payload: VariantCreate) -> Result<Self, StoreError> {
        if payload.price.is_sign_negative() {
            return Err(StoreError::Rejected(format!("variant price must be non-negative, got {}", payload.price)));
        }
        Ok(Self {
            id,
            product_id: payload.product_id,
            product_name: payload.product_name,
            image: payload.image,
            price: payload.price,
            quantity: payload.quantity,
            version: 1,
            settled_drafts: Default::default(),
        })
    }

    fn on_update(&mut self, patch: VariantPatch) -> Result<(), StoreError> {
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        self.version += 1;
        Ok(())
    }

    fn handle_action(&mut self, action: VariantAction) -> Result<VariantActionResult, StoreError> {
        match action {
            VariantAction::AdjustQuantity(delta) => {
                self.quantity += delta;
                self.version += 1;
                Ok(VariantActionResult::Adjusted { quantity: self.quantity })
            }
            VariantAction::BumpVersion { expected } => {
                if self.version != expected {
                    return Err(StoreError::VersionConflict {
                        id: self.id.to_string(),
                        expected,
                        actual: self.version,
                    });
                }
                self.version += 1;
                Ok(VariantActionResult::Bumped { version: self.version })
            }
            VariantAction::SettleDraft { draft_id, delta } => {
                if self.settled_drafts.insert(draft_id) {
                    self.quantity += delta;
                    self.version += 1;
                }
                Ok(VariantActionResult::Adjusted { quantity: self.quantity })
            }
            VariantAction::ForgetDrafts(draft_ids) => {
                for draft_id in &draft_ids {
                    self.settled_drafts.remove(draft_id);
                }
                Ok(VariantActionResult::Forgotten { remaining: self.settled_drafts.len() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn variant() -> ProductVariant {
        ProductVariant::from_create(
            7,
            VariantCreate {
                product_id: 1,
                product_name: "Mug".into(),
                image: "mug.png".into(),
                price: Decimal::new(1250, 2),
                quantity: 3,
            },
        )
        .unwrap()
    }

    #[test]
    fn adjust_moves_quantity_and_version() {
        let mut v = variant();
        assert_eq!(
            v.handle_action(VariantAction::AdjustQuantity(-2)).unwrap(),
            VariantActionResult::Adjusted { quantity: 1 }
        );
        assert_eq!(v.version, 2);
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let mut v = variant();
        v.handle_action(VariantAction::BumpVersion { expected: 1 }).unwrap();
        let err = v.handle_action(VariantAction::BumpVersion { expected: 1 }).unwrap_err();
        assert_eq!(err, StoreError::VersionConflict { id: "7".into(), expected: 1, actual: 2 });
        assert_eq!(v.version, 2);
    }

    #[test]
    fn settles_each_draft_once() {
        let mut v = variant();
        let settle = VariantAction::SettleDraft { draft_id: 11, delta: -2 };
        assert_eq!(v.handle_action(settle.clone()).unwrap(), VariantActionResult::Adjusted { quantity: 1 });
        assert_eq!(v.handle_action(settle).unwrap(), VariantActionResult::Adjusted { quantity: 1 });
        assert_eq!(v.version, 2);

        assert_eq!(
            v.handle_action(VariantAction::ForgetDrafts(vec![11])).unwrap(),
            VariantActionResult::Forgotten { remaining: 0 }
        );
    }
}
