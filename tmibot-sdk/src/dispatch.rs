//! Routing of parsed lines to callback buckets.
//!
//! Every pass iterates a snapshot of one bucket in insertion order and
//! awaits each callback before starting the next. Removals queued during
//! the pass are applied by the flush that follows it. A callback error ends
//! the pass and is returned to the read loop, which exits.

use crate::bot::Bot;
use crate::error::{Error, Result};
use crate::irc::Message;
use crate::registry::{BoxFuture, Bucket, BucketKind, Registry};

/// Whether the read loop should keep going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reconnect,
}

/// Picks one bucket out of the registry.
pub(crate) type Select<A> = fn(&mut Registry) -> &mut Bucket<A>;

/// Invoke every callback of a bucket with `arg`. Does not flush.
pub(crate) async fn run_bucket<A: Clone>(bot: &Bot, select: Select<A>, arg: A) -> Result<()> {
    let (kind, entries) = bot.with_registry(|r| {
        let bucket = select(r);
        (bucket.kind(), bucket.snapshot())
    });
    for (name, cb) in entries {
        tracing::trace!(bucket = %kind, name = %name, "invoke");
        invoke(bot, kind, &name, cb(bot.clone(), arg.clone())).await?;
    }
    Ok(())
}

pub(crate) fn flush<A>(bot: &Bot, select: Select<A>) {
    let removed = bot.with_registry(|r| select(r).flush());
    if removed > 0 {
        tracing::debug!(removed, "flushed callbacks");
    }
}

async fn invoke(bot: &Bot, bucket: BucketKind, name: &str, fut: BoxFuture) -> Result<()> {
    let result = match bot.config().callback_timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::CallbackTimeout {
                bucket,
                name: name.to_string(),
                timeout,
            })?,
        None => fut.await,
    };
    result.map_err(|source| Error::Callback {
        bucket,
        name: name.to_string(),
        source,
    })
}

/// Receive timed out: run checks.
pub(crate) async fn on_idle(bot: &Bot) -> Result<()> {
    run_bucket(bot, |r| &mut r.checks, ()).await?;
    flush(bot, |r| &mut r.checks);
    Ok(())
}

/// Route one parsed line by its IRC command.
pub(crate) async fn dispatch(bot: &Bot, msg: Message) -> Result<Flow> {
    match msg.irc_command.as_str() {
        "PING" => {
            let payload = msg.text.as_deref().unwrap_or_default();
            bot.send_raw("PONG", &format!(":{payload}")).await?;
        }
        "PRIVMSG" => on_privmsg(bot, msg).await?,
        "PART" => on_part(bot, msg).await?,
        "CLEARCHAT" => {
            if let (Some(channel), Some(text)) = (msg.channel, msg.text) {
                run_bucket(bot, |r| &mut r.after_clear_chat, (channel, text)).await?;
                flush(bot, |r| &mut r.after_clear_chat);
            }
        }
        "CLEARMSG" => {
            if let (Some(channel), Some(text)) = (msg.channel, msg.text) {
                run_bucket(bot, |r| &mut r.after_delete_message, (channel, text)).await?;
                flush(bot, |r| &mut r.after_delete_message);
            }
        }
        "GLOBALUSERSTATE" => {
            tracing::info!("Authenticated");
            run_bucket(bot, |r| &mut r.after_bot_connected, ()).await?;
            flush(bot, |r| &mut r.after_bot_connected);
        }
        "NOTICE" => {
            let text = msg.text.as_deref().unwrap_or_default();
            if text.contains("authentication failed") || text.contains("Improperly formatted auth")
            {
                tracing::warn!(notice = %text, "Gateway rejected login");
            } else {
                tracing::info!(channel = ?msg.channel, notice = %text, "NOTICE");
            }
        }
        "RECONNECT" => {
            tracing::warn!("Gateway asked us to reconnect");
            return Ok(Flow::Reconnect);
        }
        other => tracing::trace!(command = %other, "ignored"),
    }
    Ok(Flow::Continue)
}

async fn on_privmsg(bot: &Bot, msg: Message) -> Result<()> {
    run_bucket(bot, |r| &mut r.listeners, msg.clone()).await?;
    flush(bot, |r| &mut r.listeners);

    let Some(name) = msg.text_command.clone() else {
        return Ok(());
    };
    let Some(command) = bot.with_registry(|r| r.commands.get(&name)) else {
        return Ok(());
    };
    tracing::debug!(command = %name, user = ?msg.user, channel = ?msg.channel, "command");

    run_bucket(bot, |r| &mut r.before_command, msg.clone()).await?;
    flush(bot, |r| &mut r.before_command);

    invoke(bot, BucketKind::Command, &name, command(bot.clone(), msg.clone())).await?;
    flush(bot, |r| &mut r.commands);

    run_bucket(bot, |r| &mut r.after_command, msg).await?;
    flush(bot, |r| &mut r.after_command);
    Ok(())
}

async fn on_part(bot: &Bot, msg: Message) -> Result<()> {
    if let Some(channel) = msg.channel.clone() {
        if msg.is_from(bot.username()) {
            bot.untrack_channel(&channel);
        }
        run_bucket(bot, |r| &mut r.after_leave_channel, channel).await?;
    }
    flush(bot, |r| &mut r.before_leave_channel);
    flush(bot, |r| &mut r.after_leave_channel);
    Ok(())
}
