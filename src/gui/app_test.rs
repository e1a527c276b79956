#[cfg(test)]
mod tests {

    use crate::core::AppConfig;
    use crate::gui::app::CardScoutApp;
    use crate::gui::grid::GridView;
    use crate::identify::controller::{status, CaptureController, CapturePhase, GridTileSwap};
    use crate::identify::pipeline::CapturePipeline;
    use crate::video::{PlayerState, VideoPlayer};

    // Test helper to create a minimal app instance for testing
    fn create_test_app() -> CardScoutApp {
        CardScoutApp {
            config: AppConfig::default(),
            player: VideoPlayer::new(),
            controller: CaptureController::new(Box::new(GridTileSwap)),
            pipeline: CapturePipeline::new("http://127.0.0.1:1/identify".to_string()),
            grid_view: GridView::new(),
            selected_video: None,
            status_message: String::new(),
        }
    }

    #[test]
    fn test_app_initialization() {
        let app = create_test_app();

        assert!(app.selected_video.is_none());
        assert!(app.status_message.is_empty());
        assert_eq!(*app.player.state(), PlayerState::Unloaded);
        assert_eq!(app.controller.phase(), CapturePhase::Idle);
        assert!(!app.controller.is_capturing());
        assert_eq!(app.controller.next_slot().number(), 1);
        assert!(app.controller.grid().iter().all(|slot| slot.state.is_empty()));
    }

    #[test]
    fn test_load_without_selection_reports_status() {
        let mut app = create_test_app();

        app.load_video();

        assert_eq!(app.status_message, status::CHOOSE_FILE);
        assert_eq!(*app.player.state(), PlayerState::Unloaded);
    }

    #[test]
    fn test_capture_without_decoded_frame_reports_status() {
        let mut app = create_test_app();

        app.trigger_capture();

        assert_eq!(app.status_message, status::VIDEO_NOT_READY);
        assert!(!app.controller.is_capturing());
        assert_eq!(app.controller.next_slot().number(), 1);
    }

    #[test]
    fn test_clear_grid_reports_status_and_resets() {
        let mut app = create_test_app();
        app.status_message = "something old".to_string();

        app.clear_grid();

        assert_eq!(app.status_message, status::GRID_CLEARED);
        assert_eq!(app.controller.next_slot().number(), 1);
        assert!(app.controller.grid().iter().all(|slot| slot.state.is_empty()));
    }

    #[test]
    fn test_config_endpoint_feeds_pipeline() {
        let app = create_test_app();
        // The default endpoint is what a fresh pipeline gets pointed at
        assert!(app.config.identify_endpoint.starts_with("http://"));
        assert!(app.config.identify_endpoint.ends_with("/identify"));
    }
}
