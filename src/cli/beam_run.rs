//! One-shot beam run from the command line: open a beam over the prompt,
//! scatter, drain stream events until every ray settles, print the results.

use std::error::Error;
use std::sync::Arc;

use crate::cli::Args;
use crate::core::beam::{BeamEndpoint, BeamStore, RayId, RayPhase};
use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::providers::resolve_session;

const DEFAULT_RAY_COUNT: usize = 2;

pub async fn run_beam(args: Args, prompt: String) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let session = resolve_session(&config, args.provider.as_deref())?;

    let (service, mut rx) = ChatStreamService::new();
    let endpoint = BeamEndpoint {
        client: reqwest::Client::new(),
        base_url: session.base_url.clone(),
        api_key: session.api_key.clone(),
        provider_name: session.provider_id.clone(),
    };
    let mut beam = BeamStore::new(endpoint, Arc::new(service));

    let mut conversation = Conversation::new();
    if let Some(system) = &args.system {
        conversation.set_system_prompt(system.clone());
    }
    conversation.push_user(prompt);

    let gather_model = args
        .models
        .first()
        .cloned()
        .or_else(|| config.get_default_model(&session.provider_id).cloned());
    beam.open(conversation.history_snapshot(), gather_model.as_deref());
    if let Some(issue) = beam.input_issue() {
        return Err(issue.to_string().into());
    }

    beam.set_ray_count(effective_ray_count(
        args.rays,
        args.models.len(),
        config.ray_count,
    ));

    let assignments: Vec<(RayId, String)> = beam
        .rays()
        .iter()
        .map(|ray| ray.id)
        .zip(args.models.iter().cloned())
        .collect();
    for (ray_id, model) in assignments {
        beam.set_ray_model(ray_id, Some(model));
    }

    eprintln!(
        "Scattering across {} rays via {}...",
        beam.rays().len(),
        session.provider_display_name
    );
    beam.start_scattering_all();

    // Events keep flowing until every dispatched ray has settled. Stale
    // events are filtered inside apply_event, so draining is unconditional.
    while beam.has_active_rays() {
        match rx.recv().await {
            Some(event) => beam.apply_event(event),
            None => break,
        }
    }

    print_results(&beam);

    let gathered = beam
        .rays()
        .iter()
        .find(|ray| ray.has_gatherable_output())
        .and_then(|ray| beam.gather(ray.id));
    match gathered {
        Some(message) => {
            let origin = message.origin_model.clone().unwrap_or_default();
            conversation.accept(message);
            eprintln!("Gathered the answer from {origin}.");
        }
        None => eprintln!("No ray produced a usable answer."),
    }

    beam.close();
    Ok(())
}

fn effective_ray_count(
    flag: Option<usize>,
    model_count: usize,
    configured: Option<usize>,
) -> usize {
    flag.or(configured)
        .unwrap_or(DEFAULT_RAY_COUNT)
        .max(model_count)
        .max(1)
}

fn print_results(beam: &BeamStore) {
    for (index, ray) in beam.rays().iter().enumerate() {
        let model = ray.model.as_deref().unwrap_or("(no model)");
        println!("── ray {}/{} · {model}", index + 1, beam.rays().len());
        match ray.phase() {
            RayPhase::Errored => {
                println!("   {}", ray.scatter_issue.as_deref().unwrap_or("Unknown error"))
            }
            _ if ray.message.content.is_empty() => println!("   (no output)"),
            _ => println!("{}", ray.message.content),
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_count_defaults_to_two_without_flags() {
        assert_eq!(effective_ray_count(None, 0, None), 2);
    }

    #[test]
    fn ray_count_never_drops_below_the_model_count() {
        assert_eq!(effective_ray_count(Some(1), 3, None), 3);
        assert_eq!(effective_ray_count(None, 4, Some(2)), 4);
    }

    #[test]
    fn explicit_flag_beats_configured_default() {
        assert_eq!(effective_ray_count(Some(5), 1, Some(2)), 5);
        assert_eq!(effective_ray_count(None, 1, Some(3)), 3);
    }

    #[test]
    fn ray_count_is_at_least_one() {
        assert_eq!(effective_ray_count(Some(0), 0, None), 1);
    }
}
