fn main() -> anyhow::Result<()> {
    rdf2tg_cli::run()
}
