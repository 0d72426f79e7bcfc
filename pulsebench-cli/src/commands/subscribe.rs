// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pulsebench subscribe` - subscriber child process.

use std::sync::Arc;

use pulsebench_core::runner::Subscriber;
use pulsebench_core::transport::UnixTransport;
use pulsebench_core::{CancelToken, Role, SignalChannel};

use super::{blocking, RoleArgs};

pub async fn execute(args: RoleArgs, cancel: CancelToken) -> Result<(), Box<dyn std::error::Error>> {
    let report = blocking(move || {
        let (params, _registry, entry) = args.resolve(Role::Subscriber)?;
        tracing::info!(identity = %entry.name, endpoint = %entry.key, "Subscriber binding");

        let channel = SignalChannel::attach(&args.channel)?;
        let transport = Arc::new(UnixTransport::listen_staged(entry.key.clone())?);
        Subscriber::new(params, transport, channel).run(&cancel)
    })
    .await?;

    tracing::debug!(
        messages = report.messages,
        dropped = report.dropped,
        file = %report.sample_file.display(),
        "Subscriber report"
    );
    Ok(())
}
