//! Greeting service.
//!
//! Every request carries a [`Greeting`]; every reply is a single line of
//! text.

use std::time::Duration;

use duplex_rpc::futures::stream;
use duplex_rpc::handler::{Aggregate, ServerStreamDriver};
use duplex_rpc::{
    CallContext, LocalTransport, MessageChannel, Pump, PumpReport, Router, Status, rpc_messages,
};
use duplex_rpc_client::{BidiCall, CallOptions, Client, ClientStreamCall, Streaming, Transport};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const GREET: &str = "greet.GreetService/Greet";
pub const GREET_WITH_DEADLINE: &str = "greet.GreetService/GreetWithDeadline";
pub const GREET_MANY_TIMES: &str = "greet.GreetService/GreetManyTimes";
pub const LONG_GREET: &str = "greet.GreetService/LongGreet";
pub const GREET_EVERYONE: &str = "greet.GreetService/GreetEveryone";

/// Number of greetings sent by `GreetManyTimes`.
pub const MANY_TIMES: usize = 10;
/// Number of work steps `GreetWithDeadline` takes before answering.
pub const DEADLINE_STEPS: u32 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// The first name, or `InvalidArgument` if it is blank.
    pub fn first_name(&self) -> Result<&str, Status> {
        let name = self.first_name.trim();
        if name.is_empty() {
            return Err(Status::invalid_argument("first name is required"));
        }
        Ok(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Greet(pub Greeting);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetWithDeadline(pub Greeting);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetManyTimes(pub Greeting);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongGreet(pub Greeting);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetEveryone(pub Greeting);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetReply {
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetWithDeadlineReply {
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetManyTimesReply {
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongGreetReply {
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreetEveryoneReply {
    pub result: String,
}

rpc_messages! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum GreetRequest {
        Greet(Greet),
        GreetWithDeadline(GreetWithDeadline),
        GreetManyTimes(GreetManyTimes),
        LongGreet(LongGreet),
        GreetEveryone(GreetEveryone),
    }
}

rpc_messages! {
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum GreetResponse {
        Greet(GreetReply),
        GreetWithDeadline(GreetWithDeadlineReply),
        GreetManyTimes(GreetManyTimesReply),
        LongGreet(LongGreetReply),
        GreetEveryone(GreetEveryoneReply),
    }
}

pub fn greet(request: Greet) -> Result<GreetReply, Status> {
    let name = request.0.first_name()?;
    Ok(GreetReply {
        result: format!("Hello, {name}!"),
    })
}

/// Greet after [`DEADLINE_STEPS`] steps of `step` each, giving up as soon
/// as the call is cancelled or its deadline passes.
pub async fn greet_with_deadline(
    ctx: &CallContext,
    request: GreetWithDeadline,
    step: Duration,
) -> Result<GreetWithDeadlineReply, Status> {
    let name = request.0.first_name()?;
    for _ in 0..DEADLINE_STEPS {
        ctx.check()?;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Status::cancelled("client cancelled the greeting")),
            _ = ctx.expired() => {
                return Err(Status::deadline_exceeded("deadline passed before the greeting"));
            }
            _ = tokio::time::sleep(step) => {}
        }
    }
    Ok(GreetWithDeadlineReply {
        result: format!("Hello, {name}!"),
    })
}

/// The [`MANY_TIMES`] greetings of one `GreetManyTimes` call.
pub fn greet_many_times(request: GreetManyTimes) -> Result<Vec<GreetManyTimesReply>, Status> {
    let name = request.0.first_name()?;
    Ok((1..=MANY_TIMES)
        .map(|i| GreetManyTimesReply {
            result: format!("Hello, {name}, greeting number {i}"),
        })
        .collect())
}

/// Collects every first name of a `LongGreet` call into one greeting.
#[derive(Clone, Debug, Default)]
pub struct LongGreeting {
    names: Vec<String>,
}

impl Aggregate for LongGreeting {
    type Item = LongGreet;
    type Output = LongGreetReply;

    fn fold(&mut self, item: LongGreet) -> Result<(), Status> {
        let name = item.0.first_name()?;
        self.names.push(name.to_owned());
        Ok(())
    }

    fn finalize(self) -> Result<LongGreetReply, Status> {
        if self.names.is_empty() {
            return Err(Status::invalid_state("nobody to greet"));
        }
        let names: Vec<String> = self.names.iter().map(|name| format!("{name}!")).collect();
        Ok(LongGreetReply {
            result: format!("Hello, {}", names.join(" ")),
        })
    }
}

/// Serve one `GreetEveryone` call: answer each greeting as it arrives.
pub async fn greet_everyone(
    channel: MessageChannel<GreetResponse, GreetRequest>,
    pump: Pump,
) -> PumpReport {
    let (events, queue) = mpsc::unbounded_channel();
    pump.run(
        channel,
        move |request: GreetEveryone| {
            let reply = request.0.first_name().map(|name| GreetEveryoneReply {
                result: format!("Hello, {name}"),
            });
            let _ = events.send(reply.clone());
            reply.map(|_| ())
        },
        UnboundedReceiverStream::new(queue),
    )
    .await
}

/// Greeting service.
#[derive(Clone, Copy, Debug)]
pub struct GreetService {
    step: Duration,
    pace: Option<Duration>,
}

impl Default for GreetService {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            pace: None,
        }
    }
}

impl GreetService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of each `GreetWithDeadline` step. Defaults to one second.
    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Wait `pace` between streamed messages.
    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn router(&self) -> Router<GreetRequest, GreetResponse> {
        let (mut driver, mut pump) = (ServerStreamDriver::new(), Pump::new());
        if let Some(pace) = self.pace {
            driver = driver.pace(pace);
            pump = pump.pace(pace);
        }
        let step = self.step;

        Router::new()
            .unary(GREET, |_ctx: CallContext, request: Greet| async move {
                tracing::info!(first_name = %request.0.first_name, "Greet invoked");
                greet(request)
            })
            .unary(
                GREET_WITH_DEADLINE,
                move |ctx: CallContext, request: GreetWithDeadline| async move {
                    tracing::info!(first_name = %request.0.first_name, "GreetWithDeadline invoked");
                    greet_with_deadline(&ctx, request, step).await
                },
            )
            .server_stream(GREET_MANY_TIMES, driver, |_ctx, request: GreetManyTimes| {
                tracing::info!(first_name = %request.0.first_name, "GreetManyTimes invoked");
                let replies = greet_many_times(request)?;
                Ok(stream::iter(replies.into_iter().map(Ok::<_, Status>)))
            })
            .client_stream(LONG_GREET, LongGreeting::default)
            .bidi(
                GREET_EVERYONE,
                move |channel: MessageChannel<GreetResponse, GreetRequest>| {
                    greet_everyone(channel, pump)
                },
            )
    }

    /// Client connected to this service in-process.
    pub fn local_client(&self) -> GreetClient<LocalTransport<GreetRequest, GreetResponse>> {
        GreetClient::new(Client::new(LocalTransport::new(self.router())))
    }
}

/// Typed client for [`GreetService`].
#[derive(Clone, Debug)]
pub struct GreetClient<T> {
    client: Client<T>,
}

impl<T> GreetClient<T>
where
    T: Transport<GreetRequest, GreetResponse>,
{
    pub fn new(client: Client<T>) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client<T> {
        &self.client
    }

    pub async fn greet(&self, greeting: Greeting) -> Result<String, Status> {
        let reply = self
            .client
            .call_unary::<GreetRequest, GreetResponse, _, GreetReply>(GREET, Greet(greeting))
            .await?;
        Ok(reply.result)
    }

    pub async fn greet_with_deadline(
        &self,
        greeting: Greeting,
        timeout: Duration,
    ) -> Result<String, Status> {
        let reply = self
            .client
            .call_unary_with_options::<GreetRequest, GreetResponse, _, GreetWithDeadlineReply>(
                GREET_WITH_DEADLINE,
                GreetWithDeadline(greeting),
                CallOptions::new().timeout(timeout),
            )
            .await?;
        Ok(reply.result)
    }

    pub async fn greet_many_times(
        &self,
        greeting: Greeting,
    ) -> Result<Streaming<GreetManyTimesReply>, Status> {
        self.client
            .call_server_stream::<GreetRequest, GreetResponse, _, GreetManyTimesReply>(
                GREET_MANY_TIMES,
                GreetManyTimes(greeting),
            )
            .await
    }

    /// Start a `LongGreet` call. Send [`LongGreet`]s, then close.
    pub fn long_greet(
        &self,
    ) -> Result<ClientStreamCall<GreetRequest, GreetResponse, LongGreetReply>, Status> {
        self.client
            .call_client_stream::<GreetRequest, GreetResponse, LongGreetReply>(LONG_GREET)
    }

    /// Start a `GreetEveryone` call.
    pub fn greet_everyone(&self) -> Result<BidiCall<GreetRequest, GreetEveryoneReply>, Status> {
        self.client
            .call_bidi_stream::<GreetRequest, GreetResponse, GreetEveryoneReply>(GREET_EVERYONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_rpc::ErrorKind;

    #[test]
    fn test_greet() {
        let reply = greet(Greet(Greeting::new("Daria", "Frolova"))).unwrap();
        assert_eq!(reply.result, "Hello, Daria!");

        let err = greet(Greet(Greeting::new("  ", "Frolova"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_greet_many_times() {
        let replies = greet_many_times(GreetManyTimes(Greeting::new("Eldar", "Gadirov"))).unwrap();
        assert_eq!(replies.len(), MANY_TIMES);
        assert_eq!(replies[0].result, "Hello, Eldar, greeting number 1");
        assert_eq!(replies[9].result, "Hello, Eldar, greeting number 10");
    }

    #[test]
    fn test_long_greeting() {
        let mut state = LongGreeting::default();
        for name in ["Daria", "Aleksandr", "Banana"] {
            state.fold(LongGreet(Greeting::new(name, "Frolov"))).unwrap();
        }
        assert_eq!(
            state.finalize().unwrap().result,
            "Hello, Daria! Aleksandr! Banana!"
        );

        let err = LongGreeting::default().finalize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greet_with_deadline_in_time() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let request = GreetWithDeadline(Greeting::new("Marina", "Gadirova"));
        let reply = greet_with_deadline(&ctx, request, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.result, "Hello, Marina!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_greet_with_deadline_expires() {
        let ctx = CallContext::with_timeout(Duration::from_millis(1500));
        let request = GreetWithDeadline(Greeting::new("Marina", "Gadirova"));
        let err = greet_with_deadline(&ctx, request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_greet_with_deadline_cancelled() {
        let ctx = CallContext::new();
        ctx.cancel();
        let request = GreetWithDeadline(Greeting::new("Nicole", "Gadirova"));
        let err = greet_with_deadline(&ctx, request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
