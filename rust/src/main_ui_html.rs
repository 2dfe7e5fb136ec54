use crate::controller::NO_FILE_LABEL;

pub fn build_main_ui_html() -> String {
    MAIN_UI_HTML.replace("__NO_FILE_LABEL__", NO_FILE_LABEL)
}

const MAIN_UI_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Image Caption Studio</title>
  <style>
    :root {
      --bg: #f4f1de;
      --panel: #ffffff;
      --line: #9bc1bc;
      --accent: #ed6a5a;
      --accent-hover: #e4998f;
      --text: #1e1e1e;
      --muted: #6b6b6b;
      --ok: #2f855a;
      --info: #2b6cb0;
      --err: #c53030;
    }
    * { box-sizing: border-box; }
    body {
      margin: 0;
      color: var(--text);
      background: var(--bg);
      font-family: "Segoe UI", "Helvetica Neue", sans-serif;
      font-size: 14px;
    }
    .wrap { max-width: 860px; margin: 32px auto; padding: 0 16px 32px; }
    .card {
      background: var(--panel);
      border-radius: 14px;
      padding: 20px;
      box-shadow: 0 2px 10px rgba(0, 0, 0, 0.08);
    }
    h1 { margin: 0 0 16px; font-size: 28px; }
    .file-row { display: flex; align-items: center; gap: 10px; margin-bottom: 14px; }
    .file-row input[type="file"] { display: none; }
    #file-name-display { color: var(--muted); overflow-wrap: anywhere; }
    .keyword-row { display: flex; align-items: center; gap: 8px; margin-bottom: 8px; }
    .keyword-input {
      flex: 1 1 auto;
      padding: 10px;
      border: 1px solid var(--line);
      border-radius: 10px;
      font: inherit;
    }
    .btn {
      border: 0;
      border-radius: 8px;
      padding: 8px 12px;
      color: #fff;
      background: var(--accent);
      font: inherit;
      font-weight: 600;
      cursor: pointer;
    }
    .btn:hover:not(:disabled) { background: var(--accent-hover); }
    .btn:disabled { opacity: 0.6; cursor: default; }
    .btn.secondary { background: #9ca3af; }
    .actions { display: flex; gap: 10px; margin-top: 12px; }
    #mensagem { margin-top: 14px; }
    #mensagem.hidden { display: none; }
    .msg-info { color: var(--info); }
    .msg-success { color: var(--ok); }
    .msg-error { color: var(--err); }
    #historico-titulo { margin: 28px 0 12px; font-size: 22px; }
    #lista-imagens { list-style: none; margin: 0; padding: 0; display: grid; gap: 14px; }
    .entry {
      display: flex;
      gap: 16px;
      background: #f3f4f6;
      border-radius: 12px;
      padding: 14px;
    }
    .preview { max-width: 200px; height: auto; border-radius: 8px; object-fit: contain; }
    .entry-body { flex: 1 1 auto; }
    .entry-title { margin: 0 0 4px; font-weight: 600; color: #374151; }
    .caption { margin: 0; overflow-wrap: anywhere; }
    .entry-actions { display: flex; gap: 8px; margin-top: 10px; }
  </style>
</head>
<body>
  <main class="wrap">
    <section class="card">
      <h1>Image Caption Studio</h1>
      <form id="form-upload">
        <div class="file-row">
          <label id="choose-file-label" class="btn" for="file">Choose image</label>
          <input id="file" type="file" accept="image/*" />
          <span id="file-name-display">__NO_FILE_LABEL__</span>
        </div>
        <div id="keywords-container"></div>
        <div class="actions">
          <button type="button" id="add-keyword-btn" class="btn secondary">Add keyword</button>
          <button type="submit" id="submit-btn" class="btn">Generate caption</button>
        </div>
      </form>
      <div id="mensagem" class="hidden"></div>
    </section>
    <h2 id="historico-titulo" style="display: none">History</h2>
    <ul id="lista-imagens"></ul>
  </main>
  <script>
    const NO_FILE_LABEL = "__NO_FILE_LABEL__";
    const form = document.getElementById("form-upload");
    const fileInput = document.getElementById("file");
    const fileNameDisplay = document.getElementById("file-name-display");
    const messageBox = document.getElementById("mensagem");
    const historyList = document.getElementById("lista-imagens");
    const historyTitle = document.getElementById("historico-titulo");
    const keywordsContainer = document.getElementById("keywords-container");
    const submitBtn = document.getElementById("submit-btn");
    let copyRefreshTimer = null;

    async function readJson(res) {
      const data = await res.json();
      if (!res.ok || !data.ok) {
        throw new Error(data.error || "request failed");
      }
      return data;
    }

    async function apiGet(path) {
      return readJson(await fetch(path, { method: "GET" }));
    }

    async function apiPost(path, body) {
      return readJson(
        await fetch(path, {
          method: "POST",
          headers: { "Content-Type": "application/json" },
          body: JSON.stringify(body || {}),
        })
      );
    }

    function showLocalError(text) {
      messageBox.className = "msg-error";
      messageBox.textContent = text;
    }

    function renderRows(rows, focusRow) {
      keywordsContainer.innerHTML = "";
      for (const row of rows) {
        const wrapper = document.createElement("div");
        wrapper.className = "keyword-row";

        const input = document.createElement("input");
        input.type = "text";
        input.className = "keyword-input";
        input.placeholder = "New keyword...";
        input.value = row.value || "";
        input.dataset.rowId = String(row.id);

        const remove = document.createElement("button");
        remove.type = "button";
        remove.className = "btn remove-btn";
        remove.textContent = "Remove";
        remove.addEventListener("click", async () => {
          try {
            applySnapshot(await apiPost("/app/rows/remove", { row_id: row.id }));
          } catch (err) {
            showLocalError(err.message);
          }
        });

        wrapper.appendChild(input);
        wrapper.appendChild(remove);
        keywordsContainer.appendChild(wrapper);
        if (focusRow === row.id) {
          input.focus();
        }
      }
    }

    function applySnapshot(data) {
      const currentValues = new Map();
      for (const input of keywordsContainer.querySelectorAll(".keyword-input")) {
        currentValues.set(input.dataset.rowId, input.value);
      }
      const rows = (data.rows || []).map((row) => ({
        id: row.id,
        value: row.value || currentValues.get(String(row.id)) || "",
      }));
      if (data.reset_form) {
        rows.forEach((row) => (row.value = ""));
      }
      renderRows(rows, data.focus_row);

      fileNameDisplay.textContent = data.file_label || NO_FILE_LABEL;
      if (data.message) {
        messageBox.className = `msg-${data.message.kind}`;
        messageBox.textContent = data.message.text;
      } else {
        messageBox.className = "hidden";
        messageBox.textContent = "";
      }

      historyTitle.style.display = data.show_history_heading ? "block" : "none";
      historyList.innerHTML = data.history_html || "";
      submitBtn.disabled = !!data.pending;

      if (data.alert) {
        alert(data.alert);
      }
    }

    form.addEventListener("submit", async (event) => {
      event.preventDefault();
      const body = new FormData();
      const file = fileInput.files && fileInput.files[0];
      if (file) {
        body.append("file", file, file.name);
      }
      for (const input of keywordsContainer.querySelectorAll(".keyword-input")) {
        body.append(`row:${input.dataset.rowId}`, input.value);
      }
      messageBox.className = "msg-info";
      messageBox.textContent = "Sending image and generating caption... Please wait.";
      submitBtn.disabled = true;
      try {
        const data = await readJson(await fetch("/app/submit", { method: "POST", body }));
        if (data.message && data.message.kind === "success") {
          form.reset();
          data.reset_form = true;
        }
        applySnapshot(data);
      } catch (err) {
        submitBtn.disabled = false;
        showLocalError(err.message);
      }
    });

    document.getElementById("add-keyword-btn").addEventListener("click", async () => {
      try {
        applySnapshot(await apiPost("/app/rows/add", {}));
      } catch (err) {
        showLocalError(err.message);
      }
    });

    fileInput.addEventListener("change", async () => {
      const file = fileInput.files && fileInput.files[0];
      try {
        applySnapshot(await apiPost("/app/file-change", { file_name: file ? file.name : null }));
      } catch (err) {
        showLocalError(err.message);
      }
    });

    historyList.addEventListener("click", async (event) => {
      const button = event.target.closest("button[data-action]");
      if (!button || button.disabled) {
        return;
      }
      const entry = button.closest("li[data-entry-id]");
      if (!entry) {
        return;
      }
      const action = button.dataset.action;
      try {
        const data = await apiPost("/app/history-action", {
          action,
          entry_id: entry.dataset.entryId,
        });
        applySnapshot(data);
        if (action === "copy" && !data.alert) {
          if (copyRefreshTimer) {
            clearTimeout(copyRefreshTimer);
          }
          copyRefreshTimer = setTimeout(async () => {
            copyRefreshTimer = null;
            try {
              applySnapshot(await apiGet("/app/init"));
            } catch (err) {
              showLocalError(err.message);
            }
          }, (data.copy_feedback_ms || 2000) + 50);
        }
      } catch (err) {
        showLocalError(err.message);
      }
    });

    async function init() {
      try {
        applySnapshot(await apiGet("/app/init"));
      } catch (err) {
        showLocalError(`Startup error: ${err.message}`);
      }
    }

    init();
  </script>
</body>
</html>
"#;
