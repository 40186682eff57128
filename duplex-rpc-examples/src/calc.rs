//! Calculator service.
//!
//! | Method                     | Shape            |
//! |----------------------------|------------------|
//! | `Sum`                      | unary            |
//! | `SquareRoot`               | unary            |
//! | `PrimeNumberDecomposition` | server streaming |
//! | `Average`                  | client streaming |
//! | `Max`                      | bidirectional    |

use std::time::Duration;

use duplex_rpc::futures::Stream;
use duplex_rpc::handler::{Aggregate, ServerStreamDriver};
use duplex_rpc::{
    CallContext, LocalTransport, MessageChannel, Pump, PumpReport, Router, Status, rpc_messages,
};
use duplex_rpc_client::{BidiCall, Client, ClientStreamCall, Streaming, Transport};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const SUM: &str = "calc.CalcService/Sum";
pub const SQUARE_ROOT: &str = "calc.CalcService/SquareRoot";
pub const PRIME_NUMBER_DECOMPOSITION: &str = "calc.CalcService/PrimeNumberDecomposition";
pub const AVERAGE: &str = "calc.CalcService/Average";
pub const MAX: &str = "calc.CalcService/Max";

/// Trial divisors tested between yields to the runtime while decomposing.
pub const DIVISORS_PER_YIELD: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SumRequest {
    pub first: i64,
    pub second: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SumResponse {
    pub result: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareRootRequest {
    pub number: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareRootResponse {
    pub root: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimeNumberDecompositionRequest {
    pub number: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimeFactor {
    pub prime: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AverageRequest {
    pub number: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AverageResponse {
    pub average: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxRequest {
    pub number: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxResponse {
    pub max: f64,
}

rpc_messages! {
    #[derive(Clone, Debug, PartialEq)]
    pub enum CalcRequest {
        Sum(SumRequest),
        SquareRoot(SquareRootRequest),
        PrimeNumberDecomposition(PrimeNumberDecompositionRequest),
        Average(AverageRequest),
        Max(MaxRequest),
    }
}

rpc_messages! {
    #[derive(Clone, Debug, PartialEq)]
    pub enum CalcResponse {
        Sum(SumResponse),
        SquareRoot(SquareRootResponse),
        PrimeFactor(PrimeFactor),
        Average(AverageResponse),
        Max(MaxResponse),
    }
}

/// Add two integers. Overflow is rejected rather than wrapped.
pub fn sum(request: SumRequest) -> Result<SumResponse, Status> {
    request
        .first
        .checked_add(request.second)
        .map(|result| SumResponse { result })
        .ok_or_else(|| {
            Status::invalid_argument(format!(
                "sum of {} and {} overflows",
                request.first, request.second
            ))
        })
}

/// Square root of a non-negative number.
pub fn square_root(request: SquareRootRequest) -> Result<SquareRootResponse, Status> {
    let number = request.number;
    // NaN fails this comparison too.
    if !(number >= 0.0) {
        return Err(Status::invalid_argument(format!(
            "received a negative number: {number}"
        )));
    }
    Ok(SquareRootResponse {
        root: number.sqrt(),
    })
}

/// Prime factors of a positive integer by trial division, smallest first and
/// repeated by multiplicity.
///
/// ```
/// use duplex_rpc_examples::calc::PrimeFactors;
///
/// let factors: Vec<i64> = PrimeFactors::new(120).unwrap().collect();
/// assert_eq!(factors, vec![2, 2, 2, 3, 5]);
/// ```
#[derive(Clone, Debug)]
pub struct PrimeFactors {
    remainder: i64,
    divisor: i64,
}

/// Result of a bounded search for the next prime factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Search {
    Factor(i64),
    Exhausted,
    /// The budget ran out before a factor was found.
    Pending,
}

impl PrimeFactors {
    /// Fails with `InvalidArgument` unless `number` is positive.
    pub fn new(number: i64) -> Result<Self, Status> {
        if number <= 0 {
            return Err(Status::invalid_argument(format!(
                "cannot decompose {number}: expected a positive number"
            )));
        }
        Ok(Self {
            remainder: number,
            divisor: 2,
        })
    }

    /// Look for the next factor, testing at most `budget` divisors.
    pub fn search(&mut self, budget: u64) -> Search {
        let mut tested = 0;
        while self.divisor <= self.remainder / self.divisor {
            if tested == budget {
                return Search::Pending;
            }
            if self.remainder % self.divisor == 0 {
                self.remainder /= self.divisor;
                return Search::Factor(self.divisor);
            }
            self.divisor += 1;
            tested += 1;
        }
        if self.remainder > 1 {
            let prime = self.remainder;
            self.remainder = 1;
            return Search::Factor(prime);
        }
        Search::Exhausted
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        match self.search(u64::MAX) {
            Search::Factor(prime) => Some(prime),
            Search::Exhausted | Search::Pending => None,
        }
    }
}

/// Stream the prime factors of `number`.
///
/// The search yields to the runtime every [`DIVISORS_PER_YIELD`] divisors, so
/// a large prime does not hold a worker thread. It stops with the context's
/// error once the call is cancelled or past its deadline.
pub fn prime_factor_stream(
    ctx: CallContext,
    number: i64,
) -> Result<impl Stream<Item = Result<PrimeFactor, Status>> + Send + 'static, Status> {
    let mut factors = PrimeFactors::new(number)?;
    Ok(async_stream::stream! {
        loop {
            match factors.search(DIVISORS_PER_YIELD) {
                Search::Factor(prime) => yield Ok(PrimeFactor { prime }),
                Search::Exhausted => break,
                Search::Pending => {
                    if let Err(status) = ctx.check() {
                        yield Err(status);
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    })
}

/// Running mean of a client stream.
///
/// The mean is updated incrementally, so large inputs never overflow a sum.
#[derive(Clone, Copy, Debug, Default)]
pub struct Average {
    mean: f64,
    count: u64,
}

impl Aggregate for Average {
    type Item = AverageRequest;
    type Output = AverageResponse;

    fn fold(&mut self, item: AverageRequest) -> Result<(), Status> {
        if !item.number.is_finite() {
            return Err(Status::invalid_argument(format!(
                "cannot average {}",
                item.number
            )));
        }
        self.count += 1;
        self.mean += (item.number - self.mean) / self.count as f64;
        Ok(())
    }

    fn finalize(self) -> Result<AverageResponse, Status> {
        if self.count == 0 {
            return Err(Status::invalid_state("no numbers to average"));
        }
        Ok(AverageResponse {
            average: self.mean,
        })
    }
}

/// Largest number seen so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningMax {
    max: Option<f64>,
}

impl RunningMax {
    /// Record `number`, returning it if it is a new maximum.
    ///
    /// The first number is always a new maximum. Equal numbers are not.
    pub fn observe(&mut self, number: f64) -> Result<Option<f64>, Status> {
        if number.is_nan() {
            return Err(Status::invalid_argument("cannot compare NaN"));
        }
        match self.max {
            Some(max) if number <= max => Ok(None),
            _ => {
                self.max = Some(number);
                Ok(Some(number))
            }
        }
    }

    pub fn current(&self) -> Option<f64> {
        self.max
    }
}

/// Serve one `Max` call: emit every new maximum as soon as it is seen.
pub async fn running_max(
    channel: MessageChannel<CalcResponse, CalcRequest>,
    pump: Pump,
) -> PumpReport {
    let (events, queue) = mpsc::unbounded_channel();
    let mut max = RunningMax::default();
    pump.run(
        channel,
        move |request: MaxRequest| match max.observe(request.number) {
            Ok(Some(new_max)) => {
                let _ = events.send(Ok(MaxResponse { max: new_max }));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(status) => {
                let _ = events.send(Err(status.clone()));
                Err(status)
            }
        },
        UnboundedReceiverStream::new(queue),
    )
    .await
}

/// Stateless calculator service.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalcService {
    pace: Option<Duration>,
}

impl CalcService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `pace` between streamed messages.
    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn router(&self) -> Router<CalcRequest, CalcResponse> {
        let (mut driver, mut pump) = (ServerStreamDriver::new(), Pump::new());
        if let Some(pace) = self.pace {
            driver = driver.pace(pace);
            pump = pump.pace(pace);
        }

        Router::new()
            .unary(SUM, |_ctx: CallContext, request: SumRequest| async move {
                tracing::info!(first = request.first, second = request.second, "Sum invoked");
                sum(request)
            })
            .unary(
                SQUARE_ROOT,
                |ctx: CallContext, request: SquareRootRequest| async move {
                    tracing::info!(number = request.number, "SquareRoot invoked");
                    ctx.check()?;
                    square_root(request)
                },
            )
            .server_stream(
                PRIME_NUMBER_DECOMPOSITION,
                driver,
                |ctx, request: PrimeNumberDecompositionRequest| {
                    tracing::info!(number = request.number, "PrimeNumberDecomposition invoked");
                    prime_factor_stream(ctx, request.number)
                },
            )
            .client_stream(AVERAGE, Average::default)
            .bidi(MAX, move |channel: MessageChannel<CalcResponse, CalcRequest>| {
                running_max(channel, pump)
            })
    }

    /// Client connected to this service in-process.
    pub fn local_client(&self) -> CalcClient<LocalTransport<CalcRequest, CalcResponse>> {
        CalcClient::new(Client::new(LocalTransport::new(self.router())))
    }
}

/// Typed client for [`CalcService`].
#[derive(Clone, Debug)]
pub struct CalcClient<T> {
    client: Client<T>,
}

impl<T> CalcClient<T>
where
    T: Transport<CalcRequest, CalcResponse>,
{
    pub fn new(client: Client<T>) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client<T> {
        &self.client
    }

    pub async fn sum(&self, first: i64, second: i64) -> Result<i64, Status> {
        let response = self
            .client
            .call_unary::<CalcRequest, CalcResponse, _, SumResponse>(
                SUM,
                SumRequest { first, second },
            )
            .await?;
        Ok(response.result)
    }

    pub async fn square_root(&self, number: f64) -> Result<f64, Status> {
        let response = self
            .client
            .call_unary::<CalcRequest, CalcResponse, _, SquareRootResponse>(
                SQUARE_ROOT,
                SquareRootRequest { number },
            )
            .await?;
        Ok(response.root)
    }

    pub async fn prime_factors(&self, number: i64) -> Result<Streaming<PrimeFactor>, Status> {
        self.client
            .call_server_stream::<CalcRequest, CalcResponse, _, PrimeFactor>(
                PRIME_NUMBER_DECOMPOSITION,
                PrimeNumberDecompositionRequest { number },
            )
            .await
    }

    /// Start an `Average` call. Send [`AverageRequest`]s, then close.
    pub fn average(
        &self,
    ) -> Result<ClientStreamCall<CalcRequest, CalcResponse, AverageResponse>, Status> {
        self.client
            .call_client_stream::<CalcRequest, CalcResponse, AverageResponse>(AVERAGE)
    }

    /// Average every number in `numbers` in one call.
    pub async fn average_of<I>(&self, numbers: I) -> Result<f64, Status>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut call = self.average()?;
        for number in numbers {
            call.send(AverageRequest { number }).await?;
        }
        Ok(call.close().await?.average)
    }

    /// Start a `Max` call.
    pub fn max(&self) -> Result<BidiCall<CalcRequest, MaxResponse>, Status> {
        self.client
            .call_bidi_stream::<CalcRequest, CalcResponse, MaxResponse>(MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_rpc::ErrorKind;

    #[test]
    fn test_prime_factors() {
        let factors: Vec<i64> = PrimeFactors::new(28).unwrap().collect();
        assert_eq!(factors, vec![2, 2, 7]);

        let factors: Vec<i64> = PrimeFactors::new(97).unwrap().collect();
        assert_eq!(factors, vec![97]);

        assert_eq!(PrimeFactors::new(1).unwrap().count(), 0);
    }

    #[test]
    fn test_prime_factors_rejects_non_positive() {
        assert_eq!(
            PrimeFactors::new(0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            PrimeFactors::new(-12).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_prime_factors_large_prime() {
        // Largest prime below 2^31.
        let factors: Vec<i64> = PrimeFactors::new(2_147_483_647).unwrap().collect();
        assert_eq!(factors, vec![2_147_483_647]);

        let factors: Vec<i64> = PrimeFactors::new(i64::MAX).unwrap().collect();
        assert_eq!(factors.iter().product::<i64>(), i64::MAX);
    }

    #[test]
    fn test_search_respects_budget() {
        // 1_000_000_007 is prime, so the search needs ~31_622 divisors.
        let mut factors = PrimeFactors::new(1_000_000_007).unwrap();
        let mut pending = 0;
        let prime = loop {
            match factors.search(DIVISORS_PER_YIELD) {
                Search::Factor(prime) => break prime,
                Search::Pending => pending += 1,
                Search::Exhausted => panic!("prime was never reported"),
            }
        };
        assert_eq!(prime, 1_000_000_007);
        assert!(pending >= 30);
        assert_eq!(factors.search(DIVISORS_PER_YIELD), Search::Exhausted);
    }

    #[tokio::test]
    async fn test_prime_factor_stream() {
        use duplex_rpc::futures::StreamExt;

        let factors: Vec<i64> = prime_factor_stream(CallContext::new(), 1_000_000_014)
            .unwrap()
            .map(|factor| factor.unwrap().prime)
            .collect()
            .await;
        assert_eq!(factors, vec![2, 1_000_000_007]);
    }

    #[tokio::test]
    async fn test_prime_factor_stream_stops_on_cancel() {
        use duplex_rpc::futures::StreamExt;

        let ctx = CallContext::new();
        let mut factors = Box::pin(prime_factor_stream(ctx.clone(), i64::MAX - 24).unwrap());
        ctx.cancel();
        let mut items = Vec::new();
        while let Some(item) = factors.next().await {
            items.push(item);
        }
        // Small factors found before the first yield may still come through.
        let err = items.pop().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(items.iter().all(Result::is_ok));
    }

    #[test]
    fn test_sum_overflow() {
        assert_eq!(sum(SumRequest { first: 3, second: 10 }).unwrap().result, 13);
        let err = sum(SumRequest {
            first: i64::MAX,
            second: 1,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_square_root_rejects_negative_and_nan() {
        assert_eq!(square_root(SquareRootRequest { number: 16.0 }).unwrap().root, 4.0);
        for number in [-1.0, f64::NAN] {
            let err = square_root(SquareRootRequest { number }).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_average_aggregate() {
        let mut average = Average::default();
        average.fold(AverageRequest { number: 10.0 }).unwrap();
        average.fold(AverageRequest { number: 20.0 }).unwrap();
        assert_eq!(average.finalize().unwrap().average, 15.0);

        let mut average = Average::default();
        average.fold(AverageRequest { number: f64::MAX }).unwrap();
        average.fold(AverageRequest { number: f64::MAX }).unwrap();
        assert_eq!(average.finalize().unwrap().average, f64::MAX);

        let err = Average::default().finalize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = Average::default()
            .fold(AverageRequest {
                number: f64::INFINITY,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_running_max() {
        let mut max = RunningMax::default();
        let emitted: Vec<f64> = [5.0, 3.0, 8.0, 8.0, 1.0, 9.0]
            .into_iter()
            .filter_map(|n| max.observe(n).unwrap())
            .collect();
        assert_eq!(emitted, vec![5.0, 8.0, 9.0]);
        assert_eq!(max.current(), Some(9.0));

        // Negative numbers still start the sequence.
        let mut max = RunningMax::default();
        assert_eq!(max.observe(-4.0).unwrap(), Some(-4.0));
        assert!(max.observe(f64::NAN).is_err());
    }

    #[test]
    fn test_router_methods() {
        let router = CalcService::new().router();
        assert_eq!(router.methods().count(), 5);
        assert_eq!(router.kind(MAX), Some(duplex_rpc::MethodKind::BidiStream));
        assert_eq!(
            router.kind(AVERAGE),
            Some(duplex_rpc::MethodKind::ClientStream)
        );
    }
}
