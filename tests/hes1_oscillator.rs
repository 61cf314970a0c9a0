//! Hes1 gene-expression oscillator with delayed transcription.
//!
//! Species `m` (mRNA) and `p` (protein). Transcription is repressed by `p`
//! and takes effect 19.7 time units after initiation.

use delayssa::{
    EngineKind, NetworkDescription, Propensity, ReactionNetwork, RunConfig, Simulator,
    Termination,
};

// ms, ps, md, pd, P0, h
const RATES: [f64; 6] = [1.0, 1.0, 0.029, 0.031, 100.0, 4.1];
const HORIZON: usize = 700;

fn hes1(transcription: Propensity) -> ReactionNetwork {
    ReactionNetwork::new(NetworkDescription {
        species: vec!["mRNA".into(), "protein".into()],
        rates: RATES.to_vec(),
        initial_state: vec![3.0, 100.0],
        reactants: vec![vec![0.0, -1.0, -1.0, 0.0], vec![-1.0, 0.0, 0.0, -1.0]],
        products: vec![vec![1.0, 1.0, 0.0, 0.0], vec![1.0, 1.0, 0.0, 0.0]],
        delays: Some(vec![19.7, 0.0, 0.0, 0.0]),
        consuming: Some(vec![false; 4]),
        propensities: vec![
            transcription,
            Propensity::custom(|r, x| r[1] * x[0]),
            Propensity::custom(|r, x| r[2] * x[0]),
            Propensity::custom(|r, x| r[3] * x[1]),
        ],
    })
    .unwrap()
}

fn closure_transcription() -> Propensity {
    Propensity::custom(|r, x| r[0] * (1.0 / (1.0 + (x[1] / r[4]).powf(r[5]))))
}

#[test]
fn hes1_is_reproducible_and_bounded() {
    let simulator = Simulator::new(hes1(closure_transcription()), EngineKind::DelayRejection);
    let config = RunConfig::new(HORIZON, 1).with_seed(20180717);

    let first = simulator.run(&config).unwrap();
    let second = simulator.run(&config).unwrap();
    assert_eq!(first.trajectory, second.trajectory);
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.terminations, vec![Termination::Horizon]);
    assert!(first.last_steps() > 0);

    let trajectory = &first.trajectory;
    assert_eq!(trajectory.shape(), (HORIZON, 2, 1));
    assert_eq!(trajectory.state_at(0, 0), vec![3.0, 100.0]);

    // Unrepressed mRNA saturates near ms/md ~ 34; protein tracks P0 ~ 100.
    let m_max = trajectory.series(0, 0).fold(0.0, f64::max);
    let p_max = trajectory.series(1, 0).fold(0.0, f64::max);
    assert!(m_max < 5.0 * RATES[0] / RATES[2], "mRNA peaked at {m_max}");
    assert!(p_max < 10.0 * RATES[4], "protein peaked at {p_max}");
    assert!(trajectory.as_slice().iter().all(|&v| v >= 0.0));
}

#[test]
fn hill_kinetics_reproduce_the_closure_model() {
    let config = RunConfig::new(HORIZON, 2).with_seed(7);
    let closure = Simulator::new(hes1(closure_transcription()), EngineKind::DelayRejection)
        .run(&config)
        .unwrap();
    let hill = Simulator::new(
        hes1(Propensity::Hill {
            vmax: 0,
            species: 1,
            k_half: 4,
            hill_n: 5,
            repressive: true,
        }),
        EngineKind::DelayRejection,
    )
    .run(&config)
    .unwrap();
    assert_eq!(closure.trajectory, hill.trajectory);
    assert_eq!(closure.steps, hill.steps);
}

#[test]
fn expression_kinetics_stay_in_the_same_regime() {
    let simulator = Simulator::new(
        hes1(Propensity::expression("r0 * (1 / (1 + (s1 / r4)^r5))")),
        EngineKind::DelayRejection,
    );
    let ensemble = simulator.run(&RunConfig::new(200, 1).with_seed(3)).unwrap();
    let p_max = ensemble.trajectory.series(1, 0).fold(0.0, f64::max);
    assert!(ensemble.last_steps() > 0);
    assert!(p_max < 10.0 * RATES[4]);
}

#[test]
fn delay_dominates_direct_method_dynamics() {
    // Same stream, but transcription lands immediately under the direct method.
    let config = RunConfig::new(HORIZON, 1).with_seed(11);
    let delayed = Simulator::new(hes1(closure_transcription()), EngineKind::DelayRejection)
        .run(&config)
        .unwrap();
    let direct = Simulator::new(hes1(closure_transcription()), EngineKind::DirectMethod)
        .run(&config)
        .unwrap();
    assert_ne!(delayed.trajectory, direct.trajectory);
    assert_eq!(direct.trajectory.state_at(0, 0), vec![3.0, 100.0]);
}
