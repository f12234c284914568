use clap::{Parser, Subcommand, ValueEnum};
use qr_engine::{
    AnswerValue, FormOptions, FormStore, Issue, ItemType, build_render_payload,
    questionnaire_schema, render_json_ui, render_text,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "FHIR questionnaire form CLI",
    long_about = "Builds a form from a Questionnaire (and an optional QuestionnaireResponse), applies answers and prints responses, issues or a render of the form"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InspectFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct FormArgs {
    /// Path to the Questionnaire JSON.
    #[arg(long, value_name = "QUESTIONNAIRE")]
    questionnaire: PathBuf,
    /// Optional QuestionnaireResponse JSON used to seed the form.
    #[arg(long, value_name = "RESPONSE")]
    response: Option<PathBuf>,
    /// Optional JSON file with form options.
    #[arg(long, value_name = "OPTIONS")]
    options: Option<PathBuf>,
    /// Answer a question before output, as `linkId=<value>`. The value is a
    /// `{"value[x]": ...}` object, a JSON literal or plain text; an empty value
    /// clears the answer.
    #[arg(long = "set", value_name = "LINK_ID=VALUE")]
    set: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the QuestionnaireResponse produced by the form.
    Response {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Validate every answer and print the issues found.
    Validate {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show the form tree with enablement, answers and issues.
    Inspect {
        #[command(flatten)]
        form: FormArgs,
        /// Output format.
        #[arg(long, value_enum, default_value_t = InspectFormat::Text)]
        format: InspectFormat,
    },
    /// Print the JSON schema of the accepted Questionnaire shape.
    Schema,
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Response { form } => run_response(form),
        Command::Validate { form } => run_validate(form),
        Command::Inspect { form, format } => run_inspect(form, format),
        Command::Schema => run_schema(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_response(args: FormArgs) -> CliResult<()> {
    let form = load_form(&args)?;
    println!("{}", serde_json::to_string_pretty(&form.response_json()?)?);
    Ok(())
}

fn run_validate(args: FormArgs) -> CliResult<()> {
    let mut form = load_form(&args)?;
    let valid = form.validate_all();
    println!(
        "Validation result: {}",
        if valid { "valid" } else { "invalid" }
    );
    describe_issues(&form.issues());

    if valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_issues(issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }
    println!("Issues:");
    for issue in issues {
        println!(
            "  {} [{}] - {}",
            issue.link_id,
            issue.code.as_str(),
            issue.diagnostics
        );
    }
}

fn run_inspect(args: FormArgs, format: InspectFormat) -> CliResult<()> {
    let form = load_form(&args)?;
    let payload = build_render_payload(&form);
    match format {
        InspectFormat::Text => println!("{}", render_text(&payload)),
        InspectFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
    }
    Ok(())
}

fn run_schema() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&questionnaire_schema())?);
    Ok(())
}

fn load_form(args: &FormArgs) -> CliResult<FormStore> {
    let questionnaire = read_json(&args.questionnaire)?;
    let response = args.response.as_deref().map(read_json).transpose()?;
    let options = match &args.options {
        Some(path) => serde_json::from_value::<FormOptions>(read_json(path)?)?,
        None => FormOptions::default(),
    };
    let mut form =
        FormStore::from_json_with_options(&questionnaire, response.as_ref(), options)?;
    for assignment in &args.set {
        apply_assignment(&mut form, assignment)?;
    }
    tracing::debug!(
        questionnaire = %args.questionnaire.display(),
        assignments = args.set.len(),
        revision = form.revision(),
        "form loaded"
    );
    Ok(form)
}

fn read_json(path: &Path) -> CliResult<Value> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

fn apply_assignment(form: &mut FormStore, assignment: &str) -> CliResult<()> {
    let (link_id, raw) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected LINK_ID=VALUE, got '{assignment}'"))?;
    let link_id = link_id.trim();
    let item_type = form
        .find(link_id)
        .ok_or_else(|| format!("unknown linkId '{link_id}'"))?
        .item_type();
    let value = parse_value(item_type, raw)
        .map_err(|err| format!("invalid value for '{link_id}': {err}"))?;
    let answer = form.first_answer(link_id)?;
    form.set_value_by_user(answer, value)?;
    Ok(())
}

fn parse_value(item_type: ItemType, raw: &str) -> Result<Option<AnswerValue>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let json = serde_json::from_str::<Value>(trimmed)
        .unwrap_or_else(|_| Value::String(trimmed.to_string()));
    if json.is_null() {
        return Ok(None);
    }
    if let Value::Object(fields) = &json
        && fields.keys().any(|key| key.starts_with("value"))
    {
        return serde_json::from_value(json.clone())
            .map(Some)
            .map_err(|err| err.to_string());
    }
    AnswerValue::from_json_for(item_type, &json)
        .map(Some)
        .ok_or_else(|| format!("expected a {} answer", item_type.as_str()))
}
