// src/lib.rs

#![doc = r#"
# Hotpage

Hotpage turns a static file server into a live-reloading preview server. HTML
responses get a small bootstrap script injected right after their `<head>` start
tag; the script subscribes to a server-sent events endpoint and either reloads
the page or hot-swaps stylesheets when the server signals a change.

## Modules

- [`signal`]: Reload signal codes and their event-stream encoding.
- [`bootstrap`]: The browser bootstrap script and the tag that loads it.
- [`scanner`]: Streaming tokenizer that finds the end of the `<head>` start tag.
- [`interceptor`]: Response decorator that splices the bootstrap tag into HTML bodies.
- [`hub`]: Set of open push connections and the one-shot broadcast over them.
- [`router`]: Classifies changed files into reload signals and rebuilds.
- [`event`]: File change event struct.
- [`watcher`]: File system watcher for change detection.
- [`web`]: HTTP server, push endpoint and injection middleware.
- [`config`]: Configuration loading and merging from CLI, file, and environment.
- [`error`]: Error types.
"#]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod interceptor;
pub mod router;
pub mod scanner;
pub mod signal;
pub mod watcher;
pub mod web;
