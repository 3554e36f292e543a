use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use ringmpc::{
    Error,
    cexpr::ceil_log2,
    config::{B2aVariant, SessionConfig},
    mpc::{
        kernel::CostReport,
        semi2k::{Semi2kOp, registry},
        session::simulate,
    },
    ring::{ArrayRef, Field, share_arith, share_bool},
};

#[test]
fn a2b_cost_at_64_bits_and_3_parties() -> Result<(), Error> {
    let registry = registry(B2aVariant::Randbit);
    let a2b = registry.get("A2B")?;
    // log rounds up: log(3) = 2
    assert_eq!(ceil_log2(3), 2);
    assert_eq!(a2b.latency().eval(64, 3), (6 + 1) * 2);
    assert_eq!(a2b.latency().eval(64, 3), 14);
    assert_eq!(a2b.comm().eval(64, 3), 6656);
    assert_eq!(a2b.comm().eval(64, 3), (2 * 6 + 1) * 2 * 64 * 2 * 2);
    assert_eq!(a2b.latency().eval(64, 2), 7);
    assert_eq!(a2b.latency().eval(64, 4), 14);
    assert_eq!(a2b.latency().eval(64, 5), 21);
    Ok(())
}

#[test]
fn add_bb_latency_at_4_bits() -> Result<(), Error> {
    let registry = registry(B2aVariant::Randbit);
    let add_bb = registry.get("AddBB")?;
    assert_eq!(add_bb.latency().eval(4, 2), 3);
    assert_eq!(add_bb.comm().eval(4, 2), 8);
    assert_eq!(add_bb.latency().to_string(), "log(K)+1");
    Ok(())
}

#[test]
fn b2a_variants() -> Result<(), Error> {
    let precomputed = registry(B2aVariant::Precomputed);
    let b2a = precomputed.get("B2A")?;
    assert_eq!((b2a.latency().eval(64, 3), b2a.comm().eval(64, 3)), (0, 0));
    let randbit = precomputed.get("B2A_Randbit")?;
    assert_eq!(
        (randbit.latency().eval(64, 3), randbit.comm().eval(64, 3)),
        (1, 128)
    );

    let cheapest = precomputed.cheapest(&["B2A_Randbit", "B2A"], 64, 3)?;
    assert_eq!(cheapest.op(), Semi2kOp::B2A);
    let cheapest = precomputed.cheapest(&["A2B", "B2A_Randbit"], 8, 2)?;
    assert_eq!(cheapest.name(), "B2A_Randbit");
    assert!(matches!(
        precomputed.cheapest(&["B2A", "NoSuchKernel"], 64, 3),
        Err(Error::UnknownKernel(_))
    ));
    Ok(())
}

#[test]
fn complexity_report() {
    let report: CostReport = registry(B2aVariant::Randbit).report(64, 3);
    assert_eq!(report.protocol, "semi2k");
    assert_eq!(report.entries.len(), Semi2kOp::ALL.len());
    let names: Vec<&str> = report.entries.iter().map(|e| e.kernel.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    let a2b = report
        .entries
        .iter()
        .find(|e| e.kernel == "A2B")
        .expect("A2B is registered");
    assert_eq!(a2b.latency, "(log(K)+1)*log(N)");
    assert_eq!((a2b.latency_value, a2b.comm_value), (14, 6656));
    let mul = report
        .entries
        .iter()
        .find(|e| e.kernel == "MulAA")
        .expect("MulAA is registered");
    assert_eq!((mul.latency_value, mul.comm_value), (1, 256));

    let bytes = bincode::serialize(&report).unwrap();
    let decoded: CostReport = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded, report);
}

/// Counts the messages one call sends; with the trusted dealer every round is one message to
/// each peer.
fn messages_per_party(kernel: &'static str, field: Field, n: usize) -> Result<Vec<u64>, Error> {
    let v = ArrayRef::random(field, 4, &mut ChaCha20Rng::seed_from_u64(1));
    let arith = share_arith(&v, n, &mut ChaCha20Rng::seed_from_u64(2));
    let boolean = share_bool(&v, n, &mut ChaCha20Rng::seed_from_u64(3));
    let config = SessionConfig::default().with_seed([1; 32]);
    simulate(n, config, move |mut session| {
        let r = session.rank();
        let operands = match kernel {
            "A2B" | "A2P" => vec![arith[r].clone()],
            "B2A" | "B2P" => vec![boolean[r].clone()],
            "MulAA" => vec![arith[r].clone(), arith[r].clone()],
            _ => vec![boolean[r].clone(), boolean[r].clone()],
        };
        async move {
            let before = session.link().stats().messages_sent;
            session.call(kernel, &operands).await?;
            Ok(session.link().stats().messages_sent - before)
        }
    })
}

#[test]
fn executed_rounds_match_declared_latency() -> Result<(), Error> {
    let registry = registry(B2aVariant::Randbit);
    for (kernel, field, n) in [
        ("AddBB", Field::Ring8, 2),
        ("AddBB", Field::Ring64, 3),
        ("AndBB", Field::Ring32, 3),
        ("MulAA", Field::Ring32, 4),
        ("A2P", Field::Ring16, 3),
        ("B2P", Field::Ring16, 3),
        ("A2B", Field::Ring8, 3),
        ("A2B", Field::Ring32, 5),
        ("B2A", Field::Ring64, 3),
    ] {
        let latency = registry
            .get(kernel)?
            .latency()
            .eval(field.bits() as u64, n as u64);
        for messages in messages_per_party(kernel, field, n)? {
            assert_eq!(messages, latency * (n as u64 - 1), "{kernel} in {field}, {n} parties");
        }
    }
    Ok(())
}
