// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator self-check.
//!
//! Loads `lifgrad.toml` (or defaults), builds a device context, runs all six
//! operators on a deterministic population and verifies the hard-reset and
//! gradient identities. Exits 1 if any check fails, 2 on setup errors.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use lifgrad::config::{load_config, load_config_str, validate_config, ConfigError, LifgradConfig};
use lifgrad::observability::{debug_flags_help, init_logging, parse_debug_flags};
use lifgrad::prelude::*;
use lifgrad::{backend_settings, logging_config, neuron_settings};
use serde::Serialize;
use tracing::{error, info};

struct Args {
    config: Option<PathBuf>,
    neurons: usize,
    steps: usize,
    json: bool,
    overrides: HashMap<String, String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: lifgrad-selfcheck [--config <path>] [--neurons <N>] [--steps <T>] [--json]\n\
         \x20                        [--set <key>=<value>]... [--debug-<crate>]...\n\n\
         Defaults:\n\
         - config: lifgrad.toml found via LIFGRAD_CONFIG_PATH / cwd / parents, else built-in defaults\n\
         - neurons: 4096\n\
         - steps: 8\n\n\
         {}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        neurons: 4096,
        steps: 8,
        json: false,
        overrides: HashMap::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--neurons" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.neurons = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--steps" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.steps = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--set" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let (key, value) = v.split_once('=').unwrap_or_else(|| usage_and_exit());
                parsed.overrides.insert(key.to_string(), value.to_string());
            }
            "--json" => parsed.json = true,
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }

    if parsed.steps == 0 {
        eprintln!("--steps must be at least 1");
        process::exit(2);
    }
    parsed
}

/// Config file when one is given or found, built-in defaults otherwise
fn resolve_config(args: &Args) -> Result<LifgradConfig, ConfigError> {
    match load_config(args.config.as_deref(), Some(&args.overrides)) {
        Err(ConfigError::FileNotFound(_)) if args.config.is_none() => {
            load_config_str("", Some(&args.overrides))
        }
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct Report {
    backend: String,
    device: String,
    neurons: usize,
    steps: usize,
    elapsed_ms: f64,
    checks: Vec<Check>,
}

impl Report {
    fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

fn outcome(name: &'static str, failures: usize, total: usize) -> Check {
    Check {
        name,
        passed: failures == 0,
        detail: format!("{}/{} elements ok", total - failures, total),
    }
}

/// Deterministic drive in [-0.5, 2.5)
fn population(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (((i + seed) * 2_654_435_761usize) % 3000) as f32 / 1000.0 - 0.5)
        .collect()
}

struct Harness<'a> {
    ctx: &'a DeviceContext,
    params: LifParameters,
    gradient: SurrogateGradient,
    neurons: usize,
    steps: usize,
}

impl Harness<'_> {
    fn tensor(&self, shape: &[usize], data: Vec<f32>) -> Result<Tensor, LifError> {
        Tensor::from_vec(self.ctx.device(), shape, data)
    }

    fn step_with_grad(
        &self,
        x: &Tensor,
        v: &Tensor,
        detach_reset: bool,
    ) -> Result<lifgrad::ops::StepForwardWithGrad, LifError> {
        ops::step_forward_with_grad(
            self.ctx,
            &x.view(),
            &v.view(),
            self.params.v_threshold,
            self.params.v_reset,
            self.gradient.alpha,
            detach_reset,
            self.gradient.function,
            self.params.reciprocal_tau,
        )
    }

    fn hard_reset(&self) -> Result<Check, LifError> {
        let n = self.neurons;
        let x = self.tensor(&[n], population(n, 1))?;
        let v = self.tensor(&[n], population(n, 2).iter().map(|v| v * 0.3).collect())?;
        let out = self.step_with_grad(&x, &v, self.gradient.detach_reset)?;

        let p = self.params;
        let failures = (0..n)
            .filter(|&i| {
                let (xi, vi) = (x.as_slice()[i], v.as_slice()[i]);
                let h = vi + p.reciprocal_tau * (xi - (vi - p.v_reset));
                let s = out.spike.as_slice()[i];
                let v_next = out.v_next.as_slice()[i];
                // GPU backends may contract to FMA; allow for last-bit differences in h
                let tol = 1e-6 * (1.0 + h.abs());
                let ok = if s == 1.0 {
                    v_next == p.v_reset && h >= p.v_threshold - tol
                } else {
                    s == 0.0 && (v_next - h).abs() <= tol && h < p.v_threshold + tol
                };
                !ok
            })
            .count();
        Ok(outcome("hard_reset_and_binary_spikes", failures, n))
    }

    fn single_step_sequence(&self) -> Result<Check, LifError> {
        let n = self.neurons;
        let x = self.tensor(&[n], population(n, 3))?;
        let x_seq = self.tensor(&[1, n], population(n, 3))?;
        let v = self.tensor(&[n], population(n, 4))?;
        let p = self.params;

        let step = ops::step_forward(
            self.ctx,
            &x.view(),
            &v.view(),
            p.v_threshold,
            p.v_reset,
            p.reciprocal_tau,
        )?;
        let seq = ops::sequence_forward(
            self.ctx,
            &x_seq.view(),
            &v.view(),
            p.v_threshold,
            p.v_reset,
            p.reciprocal_tau,
        )?;

        let failures = (0..n)
            .filter(|&i| {
                step.spike.as_slice()[i].to_bits() != seq.spike_seq.as_slice()[i].to_bits()
                    || step.v_next.as_slice()[i].to_bits() != seq.v_final.as_slice()[i].to_bits()
            })
            .count();
        Ok(outcome("sequence_t1_bit_identical_to_step", failures, n))
    }

    fn sequence_matches_chained_steps(&self) -> Result<Check, LifError> {
        let (t, n) = (self.steps, self.neurons);
        let p = self.params;
        let drive = population(t * n, 5);
        let x_seq = self.tensor(&[t, n], drive.clone())?;
        let v0 = self.tensor(&[n], vec![0.0; n])?;

        let seq = ops::sequence_forward(
            self.ctx,
            &x_seq.view(),
            &v0.view(),
            p.v_threshold,
            p.v_reset,
            p.reciprocal_tau,
        )?;

        let mut v = v0;
        let mut failures = 0;
        for (step, chunk) in drive.chunks(n).enumerate() {
            let x = self.tensor(&[n], chunk.to_vec())?;
            let out = ops::step_forward(
                self.ctx,
                &x.view(),
                &v.view(),
                p.v_threshold,
                p.v_reset,
                p.reciprocal_tau,
            )?;
            let expected = &seq.spike_seq.as_slice()[step * n..(step + 1) * n];
            failures += expected
                .iter()
                .zip(out.spike.as_slice())
                .filter(|(a, b)| a != b)
                .count();
            v = out.v_next;
        }
        failures += v
            .as_slice()
            .iter()
            .zip(seq.v_final.as_slice())
            .filter(|(a, b)| a != b)
            .count();
        Ok(outcome("sequence_equals_chained_steps", failures, t * n + n))
    }

    fn bptt_reproduces_surrogate(&self) -> Result<Check, LifError> {
        let (t, n) = (self.steps, self.neurons);
        let p = self.params;
        let x_seq = self.tensor(&[t, n], population(t * n, 6))?;
        let v = self.tensor(&[n], vec![0.0; n])?;

        // reciprocal_tau = 1: no potential gradient crosses steps
        let fwd = ops::sequence_forward_with_grad(
            self.ctx,
            &x_seq.view(),
            &v.view(),
            p.v_threshold,
            p.v_reset,
            self.gradient.alpha,
            self.gradient.detach_reset,
            self.gradient.function,
            1.0,
        )?;
        let ones = self.tensor(&[t, n], vec![1.0; t * n])?;
        let zeros = self.tensor(&[n], vec![0.0; n])?;
        let bwd = ops::sequence_backward(
            self.ctx,
            &ones.view(),
            &zeros.view(),
            &fwd.grad_s_to_h_seq.view(),
            &fwd.grad_v_to_h_seq.view(),
            1.0,
        )?;

        let failures = bwd
            .grad_x_seq
            .as_slice()
            .iter()
            .zip(fwd.grad_s_to_h_seq.as_slice())
            .filter(|(a, b)| a != b)
            .count();
        Ok(outcome("bptt_reproduces_grad_s_to_h", failures, t * n))
    }

    fn combiner_linearity(&self) -> Result<Check, LifError> {
        let n = self.neurons;
        let gs = population(n, 7);
        let gvn = population(n, 8);
        let gsh: Vec<f32> = population(n, 9).iter().map(|g| g.abs()).collect();
        let gvh = population(n, 10);

        let bwd = ops::step_backward(
            self.ctx,
            &self.tensor(&[n], gs.clone())?.view(),
            &self.tensor(&[n], gvn.clone())?.view(),
            &self.tensor(&[n], gsh.clone())?.view(),
            &self.tensor(&[n], gvh.clone())?.view(),
            self.params.reciprocal_tau,
        )?;

        let failures = (0..n)
            .filter(|&i| {
                let grad_h = gs[i] * gsh[i] + gvn[i] * gvh[i];
                let sum = bwd.grad_x.as_slice()[i] + bwd.grad_v.as_slice()[i];
                (sum - grad_h).abs() > 1e-5 * (1.0 + grad_h.abs())
            })
            .count();
        Ok(outcome("combiner_linearity", failures, n))
    }

    fn canonical_cases(&self) -> Result<Check, LifError> {
        let x = self.tensor(&[2], vec![1.0, 0.3])?;
        let v = self.tensor(&[2], vec![0.0, 0.0])?;
        let out = ops::step_forward(self.ctx, &x.view(), &v.view(), 1.0, 0.0, 1.0)?;

        let passed = out.spike.as_slice() == [1.0, 0.0] && out.v_next.as_slice() == [0.0, 0.3];
        Ok(Check {
            name: "canonical_fire_and_subthreshold",
            passed,
            detail: format!(
                "spike={:?} v_next={:?}",
                out.spike.as_slice(),
                out.v_next.as_slice()
            ),
        })
    }

    fn detach_reset_modes(&self) -> Result<Check, LifError> {
        let n = self.neurons;
        let x = self.tensor(&[n], population(n, 11))?;
        let v = self.tensor(&[n], vec![0.0; n])?;
        let attached = self.step_with_grad(&x, &v, false)?;
        let detached = self.step_with_grad(&x, &v, true)?;

        let p = self.params;
        let mut failures = 0;
        for i in 0..n {
            let s = attached.spike.as_slice()[i];
            let same_forward = s == detached.spike.as_slice()[i]
                && attached.v_next.as_slice()[i] == detached.v_next.as_slice()[i];
            // Detached: the reset branch contributes nothing
            let detached_ok = detached.grad_v_to_h.as_slice()[i] == 1.0 - s;
            let h = p.reciprocal_tau * (x.as_slice()[i] + p.v_reset);
            let expect_differ =
                s == 1.0 && h != p.v_reset && attached.grad_s_to_h.as_slice()[i] != 0.0;
            let differs = attached.grad_v_to_h.as_slice()[i] != detached.grad_v_to_h.as_slice()[i];
            if !same_forward || !detached_ok || (expect_differ && !differs) {
                failures += 1;
            }
        }
        Ok(outcome("detach_reset_only_changes_grad_v_to_h", failures, n))
    }
}

fn run_checks<'a>(harness: &Harness<'a>) -> Vec<Check> {
    let checks: [(&'static str, fn(&Harness<'a>) -> Result<Check, LifError>); 7] = [
        ("hard_reset_and_binary_spikes", Harness::hard_reset),
        ("sequence_t1_bit_identical_to_step", Harness::single_step_sequence),
        ("sequence_equals_chained_steps", Harness::sequence_matches_chained_steps),
        ("bptt_reproduces_grad_s_to_h", Harness::bptt_reproduces_surrogate),
        ("combiner_linearity", Harness::combiner_linearity),
        ("canonical_fire_and_subthreshold", Harness::canonical_cases),
        ("detach_reset_only_changes_grad_v_to_h", Harness::detach_reset_modes),
    ];

    checks
        .into_iter()
        .map(|(name, check)| {
            check(harness).unwrap_or_else(|e| {
                error!("❌ {} failed to run: {}", name, e);
                Check {
                    name,
                    passed: false,
                    detail: e.to_string(),
                }
            })
        })
        .collect()
}

fn main() {
    let args = parse_args();

    let config = resolve_config(&args).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        process::exit(2);
    });
    if let Err(e) = validate_config(&config) {
        eprintln!("{e}");
        process::exit(2);
    }

    let _logging = init_logging(&parse_debug_flags(), &logging_config(&config)).unwrap_or_else(|e| {
        eprintln!("Failed to initialise logging: {e:#}");
        process::exit(2);
    });

    let settings = backend_settings(&config);
    let neuron = neuron_settings(&config);
    let (settings, (params, gradient)) = match (settings, neuron) {
        (Ok(backend), Ok(neuron)) => (backend, neuron),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    let ctx = match settings.backend_type {
        BackendType::Auto => DeviceContext::auto(
            args.neurons,
            args.steps,
            &settings.config,
            settings.device_ordinal,
        ),
        explicit => DeviceContext::new(explicit, &settings.config, settings.device_ordinal),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to create device context: {e}");
        process::exit(2);
    });

    info!(
        "Running self-check on {} ({} neurons x {} steps, surrogate {})",
        ctx.backend_name(),
        args.neurons,
        args.steps,
        gradient.function
    );

    let harness = Harness {
        ctx: &ctx,
        params,
        gradient,
        neurons: args.neurons,
        steps: args.steps,
    };
    let start = Instant::now();
    let checks = run_checks(&harness);
    let report = Report {
        backend: ctx.backend_name().to_string(),
        device: ctx.device().to_string(),
        neurons: args.neurons,
        steps: args.steps,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        checks,
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize report: {e}");
                process::exit(2);
            }
        }
    } else {
        println!(
            "lifgrad self-check: {} on {} ({} neurons x {} steps, {:.1}ms)",
            report.backend, report.device, report.neurons, report.steps, report.elapsed_ms
        );
        for check in &report.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            println!("  [{mark}] {:<40} {}", check.name, check.detail);
        }
    }

    if !report.passed() {
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_checks_pass_on_cpu() {
        let ctx = DeviceContext::cpu();
        let harness = Harness {
            ctx: &ctx,
            params: LifParameters::default(),
            gradient: SurrogateGradient::default(),
            neurons: 257,
            steps: 5,
        };
        let checks = run_checks(&harness);
        assert_eq!(checks.len(), 7);
        for check in &checks {
            assert!(check.passed, "{}: {}", check.name, check.detail);
        }
    }
}
