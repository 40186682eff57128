//! Message discriminator enums.
//!
//! A service exchanges one request enum and one response enum over every
//! call; each variant wraps the payload of one method. [`rpc_messages!`]
//! declares such an enum together with the `From` / `TryFrom` conversions that
//! channel helpers such as [`FrameReceiver::recv_as`](crate::FrameReceiver::recv_as)
//! and [`FrameSender::send`](crate::FrameSender::send) use to move between the
//! enum and a concrete payload.

/// Declare a message enum with one variant per payload type.
///
/// Each payload type may appear in at most one variant.
///
/// # Example
///
/// ```
/// use duplex_rpc_core::rpc_messages;
///
/// #[derive(Debug, PartialEq)]
/// pub struct Ping(pub u32);
/// #[derive(Debug, PartialEq)]
/// pub struct Pong(pub u32);
///
/// rpc_messages! {
///     #[derive(Debug, PartialEq)]
///     pub enum PingMessage {
///         Ping(Ping),
///         Pong(Pong),
///     }
/// }
///
/// let msg: PingMessage = Ping(1).into();
/// assert_eq!(msg.variant_name(), "Ping");
/// assert_eq!(Ping::try_from(msg), Ok(Ping(1)));
/// assert!(Pong::try_from(PingMessage::Ping(Ping(2))).is_err());
/// ```
#[macro_export]
macro_rules! rpc_messages {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident($payload:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant($payload)),+
        }

        impl $name {
            /// Name of the variant carried by this message.
            pub fn variant_name(&self) -> &'static str {
                match self {
                    $($name::$variant(_) => stringify!($variant)),+
                }
            }
        }

        $(
            impl ::core::convert::From<$payload> for $name {
                fn from(payload: $payload) -> Self {
                    $name::$variant(payload)
                }
            }

            impl ::core::convert::TryFrom<$name> for $payload {
                type Error = $name;

                #[allow(unreachable_patterns)]
                fn try_from(message: $name) -> ::core::result::Result<Self, Self::Error> {
                    match message {
                        $name::$variant(payload) => Ok(payload),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}
