// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pulsebench publish` - publisher child process.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pulsebench_core::runner::Publisher;
use pulsebench_core::transport::UnixTransport;
use pulsebench_core::{CancelToken, Role, SignalChannel};

use super::{blocking, RoleArgs};

pub async fn execute(
    args: RoleArgs,
    pause_us: u64,
    cancel: CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = blocking(move || {
        let (params, registry, entry) = args.resolve(Role::Publisher)?;
        tracing::info!(identity = %entry.name, channel = %args.channel, "Publisher attaching");

        let channel = SignalChannel::attach(&args.channel)?;
        let peers = registry.all_keys_for_role(Role::Subscriber);
        let transport = Arc::new(UnixTransport::connect(peers)?);

        let publisher = Publisher::new(
            params,
            Duration::from_micros(pause_us),
            transport.clone(),
            channel,
        );
        let report = publisher.run(&cancel);

        let counters = transport.counters();
        tracing::debug!(
            sent = counters.sent.load(Ordering::Relaxed),
            unreachable = counters.unreachable.load(Ordering::Relaxed),
            "Transport counters"
        );
        report
    })
    .await?;

    tracing::debug!(
        sent = report.sent,
        samples = report.samples,
        file = %report.sample_file.display(),
        "Publisher report"
    );
    Ok(())
}
