//! REST API and embedded visualizer page

use crate::analyzer::{AnalysisError, AnalysisRequest, Analyzer};
use crate::normalize::AnalysisRecord;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// API state
pub struct ApiState {
    pub analyzer: Arc<Analyzer>,
    /// Auto-advance interval handed to the page
    pub autoplay_interval_ms: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub model: String,
    /// False when no API key can be found; the page disables analysis
    pub credential_available: bool,
    pub autoplay_interval_ms: u64,
}

/// Error body for failed analyses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub error: String,
}

/// Map an analysis failure onto an HTTP status and a user-facing body
pub fn error_response(err: &AnalysisError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match err {
        AnalysisError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        AnalysisError::AuthenticationMissing(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "authentication_missing")
        }
        AnalysisError::ServiceUnavailable(_) => (StatusCode::BAD_GATEWAY, "service_unavailable"),
        AnalysisError::MalformedModelOutput(_) => {
            (StatusCode::BAD_GATEWAY, "malformed_model_output")
        }
    };
    (
        status,
        Json(ErrorResponse {
            kind,
            error: err.to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(visualize_page))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let provider = state.analyzer.provider();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: provider.name().to_string(),
        model: provider.model().to_string(),
        credential_available: state.analyzer.credential_available(),
        autoplay_interval_ms: state.autoplay_interval_ms,
    })
}

/// Run one analysis
async fn analyze(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisRecord>, (StatusCode, Json<ErrorResponse>)> {
    match state.analyzer.run(&request).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => {
            warn!(task = %request.task(), error = %e, "Analysis failed");
            Err(error_response(&e))
        }
    }
}

/// Visualization page
async fn visualize_page() -> Html<&'static str> {
    Html(VISUALIZE_HTML)
}

const VISUALIZE_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Code Visualizer</title>
    <style>
        :root {
            --bg: #1a1a2e;
            --card: #16213e;
            --accent: #0f3460;
            --highlight: #e94560;
            --text: #eee;
            --muted: #888;
            --success: #4ade80;
            --error: #f87171;
            --warn: #f59e0b;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: 'SF Mono', 'Consolas', monospace;
            background: var(--bg);
            color: var(--text);
            min-height: 100vh;
            padding: 20px;
        }
        .container { max-width: 1400px; margin: 0 auto; }
        h1 { font-size: 1.5rem; margin-bottom: 20px; color: var(--highlight); }
        h2 { font-size: 1rem; color: var(--muted); margin-bottom: 10px; }
        .card { background: var(--card); padding: 20px; border-radius: 12px; margin-bottom: 20px; }
        .row { display: flex; gap: 15px; align-items: end; margin-bottom: 15px; flex-wrap: wrap; }
        label { font-size: 0.85rem; color: var(--muted); margin-bottom: 5px; display: block; }
        textarea, select {
            width: 100%;
            background: var(--bg);
            border: 1px solid var(--accent);
            border-radius: 8px;
            padding: 12px;
            color: var(--text);
            font-family: inherit;
            font-size: 0.9rem;
        }
        textarea { height: 220px; resize: vertical; }
        textarea:focus, select:focus { outline: none; border-color: var(--highlight); }
        button {
            background: var(--highlight);
            color: white;
            border: none;
            padding: 10px 22px;
            border-radius: 8px;
            font-size: 0.95rem;
            cursor: pointer;
            font-weight: 600;
        }
        button.secondary { background: var(--accent); }
        button:disabled { opacity: 0.5; cursor: not-allowed; }
        .banner { padding: 12px; border-radius: 8px; margin-bottom: 15px; }
        .banner.warn { background: rgba(245, 158, 11, 0.15); color: var(--warn); }
        .banner.error { background: rgba(248, 113, 113, 0.15); color: var(--error); }
        .hidden { display: none; }
        .grid { display: grid; grid-template-columns: 3fr 2fr; gap: 20px; }
        .source { background: var(--bg); border-radius: 8px; padding: 10px 0; overflow-x: auto; }
        .source div { white-space: pre; padding: 0 12px; }
        .source div.active { background: var(--accent); border-left: 3px solid var(--highlight); }
        .source .num { color: var(--muted); display: inline-block; width: 3em; }
        .detail dt { color: var(--muted); font-size: 0.8rem; margin-top: 10px; }
        .detail dd { white-space: pre-wrap; }
        #progress { color: var(--success); }
    </style>
</head>
<body>
    <div class="container">
        <h1>Code Visualizer</h1>

        <div id="authBanner" class="banner warn hidden">
            No API key is configured on the server. Analysis is disabled.
        </div>
        <div id="errorBanner" class="banner error hidden"></div>

        <div class="card">
            <div class="row">
                <div>
                    <label for="language">Language</label>
                    <select id="language">
                        <option>python</option>
                        <option>javascript</option>
                        <option>typescript</option>
                        <option>rust</option>
                        <option>go</option>
                        <option>java</option>
                        <option>c</option>
                        <option>cpp</option>
                        <option>csharp</option>
                        <option>ruby</option>
                    </select>
                </div>
                <div>
                    <label for="task">Analysis</label>
                    <select id="task">
                        <option value="trace">Execution trace</option>
                        <option value="error_scan">Error scan</option>
                        <option value="complexity">Complexity</option>
                    </select>
                </div>
                <button id="analyzeBtn" disabled>Analyze</button>
            </div>
            <label for="code">Code</label>
            <textarea id="code" placeholder="Paste code here"></textarea>
        </div>

        <div id="traceView" class="card hidden">
            <div class="row">
                <button class="secondary" id="prevBtn">Prev</button>
                <button id="playBtn">Play</button>
                <button class="secondary" id="nextBtn">Next</button>
                <button class="secondary" id="resetBtn">Reset</button>
                <span id="progress"></span>
            </div>
            <p id="summary" style="margin-bottom: 15px;"></p>
            <div class="grid">
                <div id="source" class="source"></div>
                <dl id="detail" class="detail"></dl>
            </div>
        </div>

        <div id="reportView" class="card hidden">
            <h2 id="reportTitle"></h2>
            <dl id="report" class="detail"></dl>
        </div>
    </div>

    <script>
        let autoplayMs = 800;
        let credentialAvailable = false;
        let trace = null;
        let source = '';
        let view = { cursor: 0, playing: false, lastTick: 0 };

        const $ = (id) => document.getElementById(id);

        function escapeHtml(s) {
            return String(s).replace(/[&<>"]/g, c => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;' }[c]));
        }

        function updateAnalyzeButton() {
            $('analyzeBtn').disabled = !credentialAvailable || $('code').value.trim() === '';
        }

        function clearResults() {
            trace = null;
            view = { cursor: 0, playing: false, lastTick: 0 };
            $('traceView').classList.add('hidden');
            $('reportView').classList.add('hidden');
        }

        async function loadHealth() {
            const health = await (await fetch('/health')).json();
            autoplayMs = health.autoplay_interval_ms;
            credentialAvailable = health.credential_available;
            $('authBanner').classList.toggle('hidden', credentialAvailable);
            updateAnalyzeButton();
        }

        async function analyze() {
            const btn = $('analyzeBtn');
            btn.disabled = true;
            btn.textContent = 'Analyzing...';
            $('errorBanner').classList.add('hidden');
            clearResults();
            source = $('code').value;
            try {
                const response = await fetch('/analyze', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({
                        source_code: source,
                        language: $('language').value,
                        task: $('task').value
                    })
                });
                const data = await response.json();
                if (!response.ok) {
                    throw new Error(data.error || response.statusText);
                }
                if (data.task === 'trace') {
                    trace = data;
                    renderTrace();
                } else {
                    renderReport(data);
                }
            } catch (e) {
                $('errorBanner').textContent = e.message;
                $('errorBanner').classList.remove('hidden');
            } finally {
                btn.textContent = 'Analyze';
                updateAnalyzeButton();
            }
        }

        function field(name, value) {
            if (value === '' || value === null || value === undefined) return '';
            if (typeof value === 'object') {
                if (Object.keys(value).length === 0) return '';
                value = JSON.stringify(value, null, 2);
            }
            return `<dt>${name}</dt><dd>${escapeHtml(value)}</dd>`;
        }

        function renderTrace() {
            $('traceView').classList.remove('hidden');
            $('summary').textContent = trace.summary;
            const total = trace.steps.length;
            if (total === 0) {
                $('progress').textContent = 'No steps';
                $('source').innerHTML = '';
                $('detail').innerHTML = '';
                return;
            }
            const step = trace.steps[view.cursor];
            $('progress').textContent = `Step ${view.cursor + 1} / ${total}`;
            $('playBtn').textContent = view.playing ? 'Pause' : 'Play';
            $('source').innerHTML = source.split('\n').map((text, i) =>
                `<div class="${step.line === i + 1 ? 'active' : ''}"><span class="num">${i + 1}</span>${escapeHtml(text)}</div>`
            ).join('');
            $('detail').innerHTML =
                field('Operation', step.operation) +
                field('Explanation', step.explanation) +
                field('Variables', step.variables) +
                field('Call stack', step.call_stack.join(' > ')) +
                field('Output', step.outputs) +
                field('Memory', step.memory_state) +
                field('Control flow', step.control_flow) +
                field('Data structures', step.data_structures) +
                field('Context', step.execution_context) +
                field('Next', step.next_action);
        }

        function renderReport(data) {
            $('reportView').classList.remove('hidden');
            let html = '';
            if (data.task === 'error_scan') {
                $('reportTitle').textContent = `${data.issues.length} issue(s)`;
                html = data.issues.map(issue =>
                    field(`Line ${issue.line}: [${issue.type}] ${issue.title}`,
                        `${issue.explanation}\n${issue.suggestion}`)
                ).join('') + field('Corrected code', data.corrected_code);
            } else {
                $('reportTitle').textContent = 'Complexity';
                html = data.functions.map(f =>
                    field(f.name, `time ${f.time_complexity}, space ${f.space_complexity}\n${f.notes}`) +
                    f.loops.map(l => field(`  loop ${l.location}`, `${l.complexity} ${l.explanation}`)).join('') +
                    f.recursions.map(r => field(`  recursion ${r.location}`, `${r.recurrence} = ${r.solution}`)).join('')
                ).join('');
            }
            $('report').innerHTML = html;
        }

        function move(delta) {
            if (!trace || trace.steps.length === 0) return;
            const total = trace.steps.length;
            view = { cursor: (view.cursor + delta + total) % total, playing: false, lastTick: 0 };
            renderTrace();
        }

        function togglePlay() {
            if (!trace) return;
            view = view.playing
                ? { ...view, playing: false, lastTick: 0 }
                : { ...view, playing: true, lastTick: performance.now() };
            renderTrace();
        }

        function reset() {
            if (!trace) return;
            view = { cursor: 0, playing: false, lastTick: 0 };
            renderTrace();
        }

        function tick(now) {
            if (trace && view.playing && trace.steps.length > 0 && now - view.lastTick >= autoplayMs) {
                view = { ...view, cursor: (view.cursor + 1) % trace.steps.length, lastTick: now };
                renderTrace();
            }
            requestAnimationFrame(tick);
        }

        $('code').addEventListener('input', updateAnalyzeButton);
        $('analyzeBtn').addEventListener('click', analyze);
        $('prevBtn').addEventListener('click', () => move(-1));
        $('nextBtn').addEventListener('click', () => move(1));
        $('playBtn').addEventListener('click', togglePlay);
        $('resetBtn').addEventListener('click', reset);

        loadHealth();
        requestAnimationFrame(tick);
    </script>
</body>
</html>
"##;
