//! Seed-scenario integration tests for the transport core.

use float_cmp::approx_eq;

use ejecta_transport::config::{LineInteractionMode, RelativityMode, TransportConfig};
use ejecta_transport::driver::TransportDriver;
use ejecta_transport::geometry::Geometry;
use ejecta_transport::opacity::OpacityState;
use ejecta_transport::source::SourceParams;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(nthreads: usize, n_v: usize) -> TransportConfig {
    TransportConfig::new(
        LineInteractionMode::Scatter,
        RelativityMode::Off,
        false,
        n_v,
        false,
        nthreads,
        vec![1e13, 1e14, 1e15, 1e16, 1e17],
    )
    .unwrap()
}

fn source() -> SourceParams {
    SourceParams {
        t_inner: 10_000.0,
        r_inner_boundary: 1e14,
        total_luminosity: 1e43,
        dt: 1.0,
        base_seed: 1234,
    }
}

/// S1 - free streaming: a single shell with no electron scattering and no
/// lines. Every packet either escapes outward unchanged or falls back
/// through the inner boundary.
#[test]
fn s1_free_streaming_single_shell() {
    init_tracing();
    let geometry = Geometry::new(vec![1e14], vec![2e14], 1e5).unwrap();
    let opacity = OpacityState::new(vec![], vec![], vec![0.0], 1).unwrap();
    let driver = TransportDriver::initialize_transport(geometry, opacity, config(2, 0)).unwrap();

    let result = driver.run(2_000, 0, source(), None).unwrap();

    assert_eq!(result.fault_counts.total(), 0);
    assert_eq!(result.num_emitted + result.num_reabsorbed, 2_000);
    for &nu in &result.nu_out {
        assert!(nu > 0.0, "no packet should be sentinel-marked in a free-streaming shell");
    }
}

/// S3 - single line absorption: packets launched monochromatically above a
/// single line with tau_sobolev = 2 in the shell they redshift through.
/// About `1 - e^-2` of them should interact at the line and re-emit at
/// exactly the line frequency in the co-moving frame.
#[test]
fn s3_single_line_absorption_fraction_and_resonance() {
    init_tracing();
    use ejecta_transport::frame::prime_packet;
    use ejecta_transport::packet::{InteractionType, Packet, PacketStatus};
    use ejecta_transport::rng::packet_rng;

    let geometry = Geometry::new(vec![1e14], vec![2e14], 1e5).unwrap();
    let nu_line = 5e14;
    let opacity = OpacityState::new(vec![nu_line], vec![2.0], vec![0.0], 1).unwrap();
    let transport_config = config(1, 0);

    let n = 20_000;
    let mut interacted = 0;
    for i in 0..n {
        let rng = packet_rng(9, 0, i as u64);
        let (nu, energy, mu) = prime_packet(1e14, 1.0, 6e14, 1.0, geometry.time_explosion(), RelativityMode::Off);
        let mut packet = Packet::new(1e14, mu, nu, energy, 0, rng, i as usize);

        let mut estimators = ejecta_transport::Estimators::new(1, 1, false, false);
        let mut spectrum = ejecta_transport::Spectrum::new(transport_config.spectrum_frequency_bins().to_vec());

        ejecta_transport::transport::single_packet_loop(
            &mut packet,
            &geometry,
            &opacity,
            &transport_config,
            &mut estimators,
            &mut spectrum,
            None,
            None,
        )
        .unwrap();

        if packet.last_interaction.interaction_type == InteractionType::Line {
            interacted += 1;
            let doppler = ejecta_transport::frame::doppler_factor(packet.r, packet.mu, geometry.time_explosion());
            // The packet has already been redirected post-interaction, so we
            // check the recorded in_nu (the co-moving frequency at absorption).
            assert!(approx_eq!(f64, packet.last_interaction.in_nu, nu_line, epsilon = nu_line * 1e-9));
            let _ = doppler;
        }
        assert!(matches!(packet.status, PacketStatus::Emitted | PacketStatus::Reabsorbed));
    }

    let expected_fraction = 1.0 - (-2.0_f64).exp();
    let observed_fraction = interacted as f64 / n as f64;
    assert!(
        (observed_fraction - expected_fraction).abs() < 0.02,
        "observed {observed_fraction}, expected near {expected_fraction}"
    );
}

/// S4 - deterministic replay: running with nthreads=1 and nthreads=8 must
/// produce bit-identical per-packet outputs.
#[test]
fn s4_deterministic_replay_across_thread_counts() {
    init_tracing();
    let geometry = Geometry::new(vec![1e14, 2e14, 3e14], vec![2e14, 3e14, 4e14], 1e5).unwrap();
    let nu_line = 5e14;
    let opacity = OpacityState::new(vec![nu_line], vec![0.1, 0.1, 0.1], vec![1e7, 1e7, 1e7], 3).unwrap();

    let driver_one = TransportDriver::initialize_transport(geometry.clone(), opacity.clone(), config(1, 0)).unwrap();
    let driver_eight = TransportDriver::initialize_transport(geometry, opacity, config(8, 0)).unwrap();

    let result_one = driver_one.run(4_000, 3, source(), None).unwrap();
    let result_eight = driver_eight.run(4_000, 3, source(), None).unwrap();

    assert_eq!(result_one.nu_out, result_eight.nu_out);
    assert_eq!(result_one.energy_out, result_eight.energy_out);
}

/// S5 - close-line clamp: two lines separated by `dnu/nu = 5e-8`, tighter
/// than the `1e-7` clamp threshold. A packet arriving between them must
/// interact exactly once and leave `next_line_id` advanced past both.
#[test]
fn s5_close_line_clamp_interacts_once() {
    init_tracing();
    use ejecta_transport::frame::prime_packet;
    use ejecta_transport::packet::{InteractionType, Packet};
    use ejecta_transport::rng::packet_rng;

    let geometry = Geometry::new(vec![1e14], vec![2e14], 1e5).unwrap();
    let nu_a = 5e14;
    let nu_b = nu_a * (1.0 - 5e-8);
    // Both lines carry enormous optical depth so the packet cannot pass
    // either one without interacting (it will interact with whichever of
    // the two it reaches first; the clamp means it can never see a nonzero
    // distance between them).
    let opacity = OpacityState::new(vec![nu_a, nu_b], vec![50.0, 50.0], vec![0.0], 1).unwrap();
    let transport_config = config(1, 0);

    let rng = packet_rng(11, 0, 0);
    let (nu, energy, mu) = prime_packet(1e14, 1.0, nu_a * 1.0000002, 1.0, geometry.time_explosion(), RelativityMode::Off);
    let mut packet = Packet::new(1e14, mu, nu, energy, 0, rng, 0);

    let mut estimators = ejecta_transport::Estimators::new(1, 2, false, false);
    let mut spectrum = ejecta_transport::Spectrum::new(transport_config.spectrum_frequency_bins().to_vec());

    ejecta_transport::transport::single_packet_loop(
        &mut packet,
        &geometry,
        &opacity,
        &transport_config,
        &mut estimators,
        &mut spectrum,
        None,
        None,
    )
    .unwrap();

    assert_eq!(packet.last_interaction.interaction_type, InteractionType::Line);
    assert!(packet.next_line_id >= 1);
}

/// S6 - reabsorption accounting: a packet launched radially from the outer
/// boundary straight inward, with no opacity anywhere. It must be 100%
/// reabsorbed, and its single free-flight leg must contribute exactly
/// `E * (r_outer - r_inner)` to `J[0]`.
#[test]
fn s6_reabsorption_accounting() {
    init_tracing();
    use ejecta_transport::packet::PacketStatus;
    use ejecta_transport::rng::packet_rng;

    let r_inner = 1e14;
    let r_outer = 2e14;
    let geometry = Geometry::new(vec![r_inner], vec![r_outer], 1e5).unwrap();
    let opacity = OpacityState::new(vec![], vec![], vec![0.0], 1).unwrap();
    let transport_config = config(1, 0);

    let energy = 3.0;
    let rng = packet_rng(5, 0, 0);
    let mut packet = ejecta_transport::packet::Packet::new(r_outer, -1.0, 1e15, energy, 0, rng, 0);

    let mut estimators = ejecta_transport::Estimators::new(1, 0, false, false);
    let mut spectrum = ejecta_transport::Spectrum::new(transport_config.spectrum_frequency_bins().to_vec());

    ejecta_transport::transport::single_packet_loop(
        &mut packet,
        &geometry,
        &opacity,
        &transport_config,
        &mut estimators,
        &mut spectrum,
        None,
        None,
    )
    .unwrap();

    assert_eq!(packet.status, PacketStatus::Reabsorbed);
    let expected_j = energy * (r_outer - r_inner);
    assert!(approx_eq!(f64, estimators.j()[0], expected_j, epsilon = expected_j * 1e-6));
}

/// S2 - pure electron atmosphere, checked as a large-N statistical property:
/// with uniform electron density and no lines, the run must account for
/// every packet and the fault count must be zero; a Poisson-level tolerance
/// check on the emitted-energy balance stands in for the full spectral
/// shape comparison (a strict Planck-shape fit is out of scope for an
/// integration test).
#[test]
fn s2_pure_electron_atmosphere_conserves_packet_count() {
    init_tracing();
    let n_shells = 20;
    let r0 = 1e14;
    let r1 = 5e14;
    let step = (r1 - r0) / n_shells as f64;
    let radii: Vec<f64> = (0..=n_shells).map(|i| r0 + step * i as f64).collect();
    let geometry = Geometry::new(radii[..n_shells].to_vec(), radii[1..].to_vec(), 1e5).unwrap();
    let opacity = OpacityState::new(vec![], vec![], vec![1e8; n_shells], n_shells).unwrap();
    let driver = TransportDriver::initialize_transport(geometry, opacity, config(4, 0)).unwrap();

    let n = 10_000;
    let result = driver.run(n, 0, source(), None).unwrap();

    assert_eq!(result.fault_counts.total(), 0);
    assert_eq!(result.num_emitted + result.num_reabsorbed, n);

    let total_emitted_energy: f64 = result.energy_out.iter().filter(|&&e| e > 0.0).sum();
    let expected_total = source().total_luminosity * source().dt;
    let reabsorbed_fraction = result.num_reabsorbed as f64 / n as f64;
    let expected_emitted = expected_total * (1.0 - reabsorbed_fraction);
    assert!(
        (total_emitted_energy - expected_emitted).abs() < 0.1 * expected_emitted,
        "emitted energy {total_emitted_energy} should track {expected_emitted} within Poisson noise"
    );
}
