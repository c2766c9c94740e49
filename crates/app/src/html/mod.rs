//! Embedded static HTML served by the preview web UI.
//!
//! Kept as `&'static str` so the page ships inside the binary.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>YOLO Live</title>
  <style>
    html, body { margin: 0; height: 100%; background: #050b16; color: #e2e8f0; font-family: ui-sans-serif, system-ui, sans-serif; }
    main { display: flex; flex-direction: column; align-items: center; gap: 1rem; padding: 1.5rem; }
    h1 { margin: 0; font-size: 1.25rem; letter-spacing: 0.08em; text-transform: uppercase; }
    img { max-width: 100%; border: 1px solid #13233d; box-shadow: 0 0 24px rgba(56, 189, 248, 0.18); }
  </style>
</head>
<body>
  <main>
    <h1>YOLO Live</h1>
    <img src="/video" alt="Live detection stream" />
  </main>
</body>
</html>
"#;
