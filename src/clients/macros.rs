/// Generates a typed request/response method on a client that talks to a
/// hand-rolled actor through `self.sender`. A closed or vanished actor maps to
/// the given error variant.
#[macro_export]
macro_rules! client_method {
    ($client:ty => fn $method:ident($($param:ident: $param_type:ty),*) -> $return_type:ty as $request:ident::$variant:ident, Error = $error_type:ident::$error_variant:ident) => {
        impl $client {
            #[tracing::instrument(skip(self))]
            pub async fn $method(&self, $($param: $param_type),*) -> Result<$return_type, $error_type> {
                tracing::debug!("Sending request");
                let (respond_to, response) = tokio::sync::oneshot::channel();
                self.sender.send($request::$variant {
                    $($param,)*
                    respond_to,
                }).await.map_err(|_| $error_type::$error_variant("actor closed".to_string()))?;

                response.await.map_err(|_| $error_type::$error_variant("actor dropped".to_string()))?
            }
        }
    };
}

/// Lookup methods shared by every table client wrapping a `ResourceClient`
/// in `self.inner`. Store errors are lifted into `OrderError`.
#[macro_export]
macro_rules! impl_client_methods {
    ($client_name:ident, $entity:ty, $entity_name_snake:ident) => {
        paste::paste! {
            #[allow(dead_code)]
            impl $client_name {
                #[tracing::instrument(skip(self))]
                pub async fn [<get_ $entity_name_snake>](&self, id: i64) -> Result<Option<$entity>, $crate::error::OrderError> {
                    tracing::debug!("Sending request");
                    Ok(self.inner.get(id).await?)
                }

                #[tracing::instrument(skip(self))]
                pub async fn [<fetch_ $entity_name_snake>](&self, id: i64) -> Result<$entity, $crate::error::OrderError> {
                    tracing::debug!("Sending request");
                    Ok(self.inner.fetch(id).await?)
                }
            }
        }
    };
}

#[macro_export]
macro_rules! impl_client_new {
    ($client_name:ident, $entity:ty) => {
        impl $client_name {
            pub fn new(inner: $crate::actor_framework::ResourceClient<$entity>) -> Self {
                Self { inner }
            }
        }
    };
}

#[macro_export]
macro_rules! impl_basic_client {
    ($client_name:ident, $entity:ty, $entity_name_snake:ident) => {
        $crate::impl_client_new!($client_name, $entity);
        $crate::impl_client_methods!($client_name, $entity, $entity_name_snake);
    };
}
