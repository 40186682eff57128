//! End-to-end calls to the calculator service through the client, the local
//! transport and the router.

use std::time::Duration;

use duplex_rpc::ErrorKind;
use duplex_rpc_examples::calc::{
    AverageRequest, CalcRequest, CalcResponse, CalcService, MaxRequest, SUM, SquareRootRequest,
    SumRequest, SumResponse,
};
use futures::StreamExt;

fn is_prime(n: i64) -> bool {
    n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

async fn primes(number: i64) -> Vec<i64> {
    let client = CalcService::new().local_client();
    let stream = client.prime_factors(number).await.unwrap();
    stream.map(|factor| factor.unwrap().prime).collect().await
}

async fn running_max(numbers: &[f64]) -> Vec<f64> {
    let client = CalcService::new().local_client();
    let mut call = client.max().unwrap();
    for &number in numbers {
        call.send(MaxRequest { number }).await.unwrap();
    }
    call.close_send().await.unwrap();
    let (_requests, responses) = call.split();
    responses.map(|max| max.unwrap().max).collect().await
}

#[tokio::test]
async fn test_sum() {
    let client = CalcService::new().local_client();
    assert_eq!(client.sum(3, 10).await.unwrap(), 13);

    let err = client.sum(i64::MAX, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_square_root() {
    let client = CalcService::new().local_client();
    for number in [0.0, 1.0, 2.0, 10.0, 12345.678] {
        let root = client.square_root(number).await.unwrap();
        assert!((root * root - number).abs() < 1e-9 * number.max(1.0));
    }
}

#[tokio::test]
async fn test_square_root_negative() {
    let client = CalcService::new().local_client();
    let err = client.square_root(-4.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("-4"));
}

#[tokio::test]
async fn test_average() {
    let client = CalcService::new().local_client();
    assert_eq!(client.average_of([10.0, 20.0]).await.unwrap(), 15.0);
    assert_eq!(client.average_of([1.0, 2.0, 3.0, 4.0]).await.unwrap(), 2.5);
}

#[tokio::test]
async fn test_average_empty() {
    let client = CalcService::new().local_client();
    let err = client.average_of([]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_average_rejects_infinity() {
    let client = CalcService::new().local_client();
    let mut call = client.average().unwrap();
    call.send(AverageRequest { number: 1.0 }).await.unwrap();

    // The server may already have failed the call by the time the next send
    // or the close runs; either way the reported failure surfaces.
    let err = match call.send(AverageRequest { number: f64::INFINITY }).await {
        Ok(()) => call.close().await.unwrap_err(),
        Err(status) => status,
    };
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_prime_decomposition() {
    assert_eq!(primes(28).await, vec![2, 2, 7]);
    assert_eq!(primes(120).await, vec![2, 2, 2, 3, 5]);
    assert!(primes(1).await.is_empty());
}

#[tokio::test]
async fn test_prime_decomposition_properties() {
    for n in 2..200 {
        let factors = primes(n).await;
        assert_eq!(factors.iter().product::<i64>(), n, "product of factors of {n}");
        assert!(factors.iter().all(|&p| is_prime(p)), "factors of {n}: {factors:?}");
        assert!(factors.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[tokio::test]
async fn test_prime_decomposition_rejects_zero() {
    let client = CalcService::new().local_client();
    let mut stream = client.prime_factors(0).await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_max() {
    assert_eq!(running_max(&[5.0, 3.0, 8.0, 1.0, 9.0]).await, vec![5.0, 8.0, 9.0]);
    assert!(running_max(&[]).await.is_empty());
}

#[tokio::test]
async fn test_max_emits_only_new_maxima() {
    let input = [4.0, 4.0, -1.0, 7.5, 7.0, 7.5, 100.0, 3.0];
    let output = running_max(&input).await;
    assert_eq!(output, vec![4.0, 7.5, 100.0]);
    assert!(output.len() <= input.len());
    assert!(output.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_max_is_reactive() {
    let client = CalcService::new().local_client();
    let mut call = client.max().unwrap();

    call.send(MaxRequest { number: 5.0 }).await.unwrap();
    assert_eq!(call.responses().message().await.unwrap().unwrap().max, 5.0);

    call.send(MaxRequest { number: 3.0 }).await.unwrap();
    call.send(MaxRequest { number: 8.0 }).await.unwrap();
    assert_eq!(call.responses().message().await.unwrap().unwrap().max, 8.0);

    call.close_send().await.unwrap();
    assert_eq!(call.responses().message().await.unwrap(), None);
}

#[tokio::test]
async fn test_max_rejects_nan() {
    let client = CalcService::new().local_client();
    let mut call = client.max().unwrap();
    call.send(MaxRequest { number: 1.0 }).await.unwrap();
    call.send(MaxRequest { number: f64::NAN }).await.unwrap();

    let (_requests, mut responses) = call.split();
    assert_eq!(responses.message().await.unwrap().unwrap().max, 1.0);
    let err = responses.message().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_n_messages() {
    let client = CalcService::new()
        .pace(Duration::from_secs(1))
        .local_client();
    // 2^20 decomposes into twenty factors of two.
    let mut stream = client.prime_factors(1 << 20).await.unwrap();

    for _ in 0..3 {
        assert_eq!(stream.next().await.unwrap().unwrap().prime, 2);
    }
    stream.cancel();

    assert!(stream.next().await.is_none());
    assert!(stream.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_paced_stream() {
    let client = CalcService::new()
        .pace(Duration::from_secs(1))
        .local_client();
    let start = tokio::time::Instant::now();

    let stream = client.prime_factors(32).await.unwrap();
    let factors: Vec<i64> = stream.map(|f| f.unwrap().prime).collect().await;

    assert_eq!(factors, vec![2; 5]);
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test]
async fn test_unknown_method() {
    let client = CalcService::new().local_client();
    let err = client
        .inner()
        .call_unary::<CalcRequest, CalcResponse, _, SumResponse>(
            "calc.CalcService/Cube",
            SumRequest { first: 1, second: 2 },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unimplemented);
}

#[tokio::test]
async fn test_wrong_message_variant() {
    let client = CalcService::new().local_client();
    let err = client
        .inner()
        .call_unary::<CalcRequest, CalcResponse, _, SumResponse>(
            SUM,
            SquareRootRequest { number: 4.0 },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
