// src/lib.rs

#![doc = r#"
# mdlive

mdlive serves a directory of markdown files as browsable HTML and reloads open
browser tabs when the files they show change on disk.

## Modules

- [`config`]: Configuration loading and merging from CLI, file, and environment.
- [`error`]: Request and startup error types.
- [`event`]: Change events and the live-reload wire message.
- [`paths`]: Canonical relative-path strings.
- [`resolver`]: Request path to file or directory on disk.
- [`render`]: Markdown documents and directory listings as HTML.
- [`view_match`]: Whether a change affects what a viewer is looking at.
- [`hub`]: Connected viewers and change fan-out.
- [`watcher`]: File system watcher for the served root.
- [`web`]: HTTP server and live-reload websocket.
"#]

pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod paths;
pub mod render;
pub mod resolver;
pub mod view_match;
pub mod watcher;
pub mod web;
