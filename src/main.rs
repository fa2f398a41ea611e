use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use cortado::descriptor::MethodSignature;
use cortado::native::{self, Console};
use cortado::registry::{ClassPath, ClassRegistry};
use cortado::runtime::Runtime;
use cortado::value::StackValue;
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "cortado", version, about = "Run a static method from a JVM class file")]
struct Cli {
    /// Class file to run.
    class_file: PathBuf,

    /// Directories searched for referenced classes, before the class
    /// file's own directory.
    #[arg(long = "class-path", short = 'c', value_delimiter = ':')]
    class_path: Vec<PathBuf>,

    /// Name of the static method to run.
    #[arg(long, default_value = "main")]
    method: String,

    /// Descriptor of the method to run. Every parameter is passed null.
    #[arg(long, default_value = "([Ljava/lang/String;)V")]
    descriptor: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    let mut roots = cli.class_path.clone();
    if let Some(parent) = cli.class_file.parent() {
        roots.push(parent.to_path_buf());
    }
    let mut registry = ClassRegistry::new(ClassPath::new(roots));
    let stdout: Console = Rc::new(RefCell::new(io::stdout()));
    native::install(&mut registry, stdout)?;

    let class = registry
        .define_class_file(&cli.class_file)
        .with_context(|| format!("cannot load {}", cli.class_file.display()))?;
    let class_name = class.name()?.to_vec();

    let signature = MethodSignature::parse(cli.descriptor.as_bytes())?;
    let args = vec![StackValue::null(); signature.params.len()];

    let mut runtime = Runtime::new(registry);
    runtime
        .invoke(&class_name, cli.method.as_bytes(), cli.descriptor.as_bytes(), args)
        .with_context(|| format!("{}.{} failed", class.display_name(), cli.method))?;
    debug!(leftover = runtime.stack().len(), "finished");
    Ok(())
}
