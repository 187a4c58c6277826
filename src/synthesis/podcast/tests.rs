use super::*;

#[test]
fn parses_speaker_lines_case_insensitively() {
    let raw = "alex: Welcome to the ThinkBook Podcast!\n\
               DR. SAM: Thanks for having me.\n\
               Dr Sam : It's a great topic.\n\
               ALEX:So where do we start?";

    let script = PodcastScript::parse(raw);
    assert_eq!(
        script.turns,
        vec![
            DialogueTurn {
                speaker: Speaker::Alex,
                text: "Welcome to the ThinkBook Podcast!".to_string(),
            },
            DialogueTurn {
                speaker: Speaker::DrSam,
                text: "Thanks for having me. It's a great topic.".to_string(),
            },
            DialogueTurn {
                speaker: Speaker::Alex,
                text: "So where do we start?".to_string(),
            },
        ]
    );
    assert!(script.is_well_formed());
}

#[test]
fn drops_narration_and_empty_lines() {
    let raw = "# Episode 1\n\n[intro music]\nAlex: Hi!\nNarrator: meanwhile\nDr. Sam:\nDr. Sam: Hello.";
    let script = PodcastScript::parse(raw);
    assert_eq!(script.turns.len(), 2);
    assert_eq!(script.turns[1].text, "Hello.");
}

#[test]
fn single_speaker_is_malformed() {
    let script = PodcastScript::parse("Alex: one\nAlex: two\nAlex: three");
    assert_eq!(script.turns.len(), 1);
    assert!(!script.is_well_formed());
    assert!(!PodcastScript::parse("no dialogue at all").is_well_formed());
}

#[test]
fn tagged_text_alternates_speakers() {
    let script = PodcastScript::parse("Alex: Question?\nDr. Sam: Answer.\nAlex: Thanks!");
    assert_eq!(
        script.to_tagged_text(),
        "Alex: Question?\nDr. Sam: Answer.\nAlex: Thanks!"
    );
}
